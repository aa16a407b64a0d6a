//! Message endpoints: submission, history, and explicit acknowledgements.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::dispatch::{DispatchReceipt, SendMessage};
use crate::error::{ApiError, ApiErrorBody};
use crate::models::message::Message;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", post(send_message).get(list_messages))
        .route("/messages/all", get(list_all_messages))
        .route("/messages/{message_id}/delivered", post(mark_delivered))
        .route("/messages/{message_id}/read", post(mark_read))
}

// ---------------------------------------------------------------------------
// POST /api/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    /// The persisted message for a direct send; absent for a broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// How many recipients the send fanned out to.
    pub recipients: usize,
}

#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "Messages",
    security(("bearer" = [])),
    request_body = SendMessage,
    responses(
        (status = 201, description = "Message persisted", body = SendMessageResponse),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn send_message(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<SendMessage>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    let receipt = state.dispatcher.send(&user_id, body).await?;

    let response = match receipt {
        DispatchReceipt::Direct(message) => SendMessageResponse {
            message: Some(message),
            recipients: 1,
        },
        DispatchReceipt::Broadcast { recipients } => SendMessageResponse {
            message: None,
            recipients,
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}

// ---------------------------------------------------------------------------
// GET /api/messages?with=<user_id>
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// The other party of the conversation.
    pub with: String,
}

#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(("with" = String, Query, description = "The other party of the conversation")),
    responses(
        (status = 200, description = "Messages between the caller and the peer", body = [Message]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_messages(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.store.messages_between(&user_id, &params.with).await?;
    Ok(Json(messages))
}

// ---------------------------------------------------------------------------
// GET /api/messages/all
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/messages/all",
    tag = "Messages",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Every message involving the caller", body = [Message]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_all_messages(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.store.messages_for_user(&user_id).await?;
    Ok(Json(messages))
}

// ---------------------------------------------------------------------------
// POST /api/messages/{message_id}/delivered | /read
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/messages/{message_id}/delivered",
    tag = "Messages",
    security(("bearer" = [])),
    params(("message_id" = String, Path, description = "Message ID")),
    responses(
        (status = 204, description = "Delivery acknowledged"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Delivery record not found", body = ApiErrorBody),
    ),
)]
pub async fn mark_delivered(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let message_id = parse_message_id(&message_id)?;
    state.coordinator.mark_delivered(message_id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/messages/{message_id}/read",
    tag = "Messages",
    security(("bearer" = [])),
    params(("message_id" = String, Path, description = "Message ID")),
    responses(
        (status = 204, description = "Read acknowledged"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Delivery record not found", body = ApiErrorBody),
    ),
)]
pub async fn mark_read(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let message_id = parse_message_id(&message_id)?;
    state.coordinator.mark_read(message_id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_message_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("Invalid message_id"))
}
