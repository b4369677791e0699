use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        session::SessionResponse,
        user::{User, UserResponse},
    },
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutOthersResponse {
    pub success: bool,
    pub message: String,
    pub sessions_invalidated: u64,
}

pub async fn profile(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

pub async fn logout_all_others(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<LogoutOthersResponse>, AppError> {
    let invalidated = state
        .session_manager
        .logout_others(user.id, &context.access_token)
        .await?;
    Ok(Json(LogoutOthersResponse {
        success: true,
        message: "Logged out from all other devices".into(),
        sessions_invalidated: invalidated,
    }))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let sessions = state
        .session_manager
        .list_sessions(user.id, &context.access_token)
        .await?;
    Ok(Json(sessions))
}
