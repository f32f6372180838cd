use axum::{extract::State, Json};
use serde::Deserialize;

use super::{state::AppState, ApiJson, DataResponse, MessageResponse, ADMIN};
use crate::auth::AuthUser;
use crate::error::AbsensiError;
use crate::settings::{
    change_password, update_username, ChangePasswordRequest, SystemSettings, SystemSettingsUpdate,
};

/// Request structure for PUT /api/admin/settings/profile
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub username: String,
}

/// PUT /api/admin/settings/password
pub async fn update_password(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    state
        .db
        .run(move |conn| change_password(conn, user.id, &req))
        .await?;
    Ok(Json(MessageResponse::new("Password changed")))
}

/// PUT /api/admin/settings/profile
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ProfileUpdateRequest>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    state
        .db
        .run(move |conn| update_username(conn, user.id, &req.username))
        .await?;
    Ok(Json(MessageResponse::new("Username updated")))
}

/// GET /api/admin/settings/system
/// Returns the stored check-in window, or the configured defaults
pub async fn get_system_settings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SystemSettings>, AbsensiError> {
    user.require(ADMIN)?;
    let defaults = state.school.clone();
    let settings = state
        .db
        .run(move |conn| SystemSettings::load(conn, &defaults))
        .await?;
    Ok(Json(settings))
}

/// PUT /api/admin/settings/system
/// Applies a partial update and stores the complete window
pub async fn update_system_settings(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(update): ApiJson<SystemSettingsUpdate>,
) -> Result<Json<DataResponse<SystemSettings>>, AbsensiError> {
    user.require(ADMIN)?;
    let defaults = state.school.clone();
    let settings = state
        .db
        .run(move |conn| {
            let mut settings = SystemSettings::load(conn, &defaults)?;
            settings.apply(update);
            settings.store(conn)?;
            Ok(settings)
        })
        .await?;

    Ok(Json(DataResponse::new("System settings saved", settings)))
}
