pub mod auth;
pub mod health;
pub mod messages;
pub mod users;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(auth::router())
        .nest("/api", users::router().merge(messages::router()))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Auth
        auth::signup,
        auth::login,
        auth::logout,
        // Users
        users::list_users,
        users::list_online_users,
        users::get_me,
        // Messages
        messages::send_message,
        messages::list_messages,
        messages::list_all_messages,
        messages::mark_delivered,
        messages::mark_read,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::message::Message,
            crate::models::message_recipient::MessageRecipient,
            crate::models::user::UserSummary,
            // Route request/response types
            health::HealthResponse,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            crate::dispatch::SendMessage,
            messages::SendMessageResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Auth", description = "Authentication"),
        (name = "Users", description = "User listing"),
        (name = "Messages", description = "Messaging and delivery state"),
    )
)]
pub struct ApiDoc;
