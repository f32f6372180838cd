use axum::{extract::State, Json};
use chrono::Utc;

use super::{state::AppState, ApiJson};
use crate::auth::{login, AuthUser, LoginRequest, LoginResponse};
use crate::error::AbsensiError;

/// POST /api/auth/login
pub async fn login_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AbsensiError> {
    let keys = state.auth.clone();
    let response = state
        .db
        .run(move |conn| login(conn, &req, &keys, Utc::now().timestamp()))
        .await?;

    Ok(Json(response))
}

/// GET /api/auth/me
pub async fn get_me(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}
