use axum::{extract::State, Json};
use serde::Serialize;

use super::{state::AppState, MessageResponse};
use crate::database::Database;
use crate::error::AbsensiError;

/// Response structure for app information
#[derive(Debug, Serialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub schema_version: String,
}

/// GET /
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse::new("Absensi QR Code API is running"))
}

/// GET /api/app-info
///
/// Returns application version and schema version
pub async fn get_app_info(State(state): State<AppState>) -> Result<Json<AppInfo>, AbsensiError> {
    let schema_version = state
        .db
        .run(|conn| Database::get_schema_version(conn))
        .await?
        .unwrap_or_else(|| "unknown".to_string());

    Ok(Json(AppInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version,
    }))
}
