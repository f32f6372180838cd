use axum::{
    extract::{Path, State},
    Json,
};

use super::{state::AppState, ApiJson, MessageResponse, ADMIN};
use crate::auth::AuthUser;
use crate::error::AbsensiError;
use crate::homerooms::{AssignRequest, Candidate, Choice, Homeroom};

/// POST /api/admin/kelas/assign-wali
pub async fn assign_homeroom(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<AssignRequest>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    let outcome = state.db.run(move |conn| Homeroom::assign(conn, &req)).await?;
    Ok(Json(MessageResponse::new(outcome.message())))
}

/// GET /api/admin/wali-kelas
pub async fn list_homerooms(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Homeroom>>, AbsensiError> {
    user.require(ADMIN)?;
    let homerooms = state.db.run(|conn| Homeroom::list(conn)).await?;
    Ok(Json(homerooms))
}

/// DELETE /api/admin/wali-kelas/{id}
pub async fn remove_homeroom(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    state.db.run(move |conn| Homeroom::remove(conn, id)).await?;
    Ok(Json(MessageResponse::new("Homeroom assignment removed")))
}

/// GET /api/admin/wali-kelas-list
pub async fn list_candidates(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Candidate>>, AbsensiError> {
    user.require(ADMIN)?;
    let candidates = state.db.run(|conn| Homeroom::candidates(conn)).await?;
    Ok(Json(candidates))
}

/// GET /api/admin/wali-kelas/available-kelas
pub async fn available_classes(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Choice>>, AbsensiError> {
    user.require(ADMIN)?;
    let classes = state.db.run(|conn| Homeroom::available_classes(conn)).await?;
    Ok(Json(classes))
}

/// GET /api/admin/wali-kelas/available-guru
pub async fn available_teachers(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Choice>>, AbsensiError> {
    user.require(ADMIN)?;
    let teachers = state.db.run(|conn| Homeroom::available_teachers(conn)).await?;
    Ok(Json(teachers))
}
