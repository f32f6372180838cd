use axum::{extract::State, Json};

use super::state::AppState;
use crate::attendance::{history_for_user, HistoryEntry};
use crate::auth::{AuthUser, Role};
use crate::error::AbsensiError;
use crate::qr::{for_student_user, QrPayload};

/// GET /api/siswa/my-qr
pub async fn get_my_qr(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<QrPayload>, AbsensiError> {
    user.require(&[Role::Siswa])?;
    let qr = state.db.run(move |conn| for_student_user(conn, user.id)).await?;
    Ok(Json(qr))
}

/// GET /api/siswa/riwayat
pub async fn get_history(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<HistoryEntry>>, AbsensiError> {
    user.require(&[Role::Siswa])?;
    let history = state.db.run(move |conn| history_for_user(conn, user.id)).await?;
    Ok(Json(history))
}
