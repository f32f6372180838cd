use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use super::{state::AppState, ADMIN};
use crate::auth::AuthUser;
use crate::error::AbsensiError;
use crate::qr::{generate_for_student, QrPayload};
use crate::students::{QrListEntry, Student};

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub message: String,
    pub qr_data: QrPayload,
}

/// GET /api/admin/qr/list-siswa
pub async fn list_students_for_qr(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<QrListEntry>>, AbsensiError> {
    user.require(ADMIN)?;
    let entries = state.db.run(|conn| Student::list_for_qr(conn)).await?;
    Ok(Json(entries))
}

/// POST /api/admin/qr/generate/{siswa_id}
pub async fn generate_qr(
    State(state): State<AppState>,
    user: AuthUser,
    Path(siswa_id): Path<i64>,
) -> Result<Json<GenerateResponse>, AbsensiError> {
    user.require(ADMIN)?;
    let qr_data = state
        .db
        .run(move |conn| generate_for_student(conn, siswa_id))
        .await?;

    Ok(Json(GenerateResponse {
        message: "QR code generated and stored".to_string(),
        qr_data,
    }))
}
