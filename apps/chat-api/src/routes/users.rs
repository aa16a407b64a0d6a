//! User listing endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::user::UserSummary;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/online", get(list_online_users))
        .route("/users/me", get(get_me))
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All users except the caller", body = [UserSummary]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_users(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = state.store.users_except(&user_id).await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/users/online",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Users currently online", body = [UserSummary]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_online_users(
    AuthUser { user_id: _ }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = state.store.online_users().await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The caller's profile", body = UserSummary),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn get_me(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserSummary>, ApiError> {
    let user = state
        .store
        .user_by_id(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserSummary::from(user)))
}
