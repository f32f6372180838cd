use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{state::AppState, ApiJson, DataResponse, MessageResponse, ADMIN};
use crate::auth::AuthUser;
use crate::error::AbsensiError;
use crate::teachers::{Teacher, TeacherRequest};

/// GET /api/admin/guru
pub async fn list_teachers(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Teacher>>, AbsensiError> {
    user.require(ADMIN)?;
    let teachers = state.db.run(|conn| Teacher::list(conn)).await?;
    Ok(Json(teachers))
}

/// POST /api/admin/guru
pub async fn create_teacher(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<TeacherRequest>,
) -> Result<(StatusCode, Json<DataResponse<Teacher>>), AbsensiError> {
    user.require(ADMIN)?;
    let teacher = state.db.run(move |conn| Teacher::create(conn, &req)).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new("Teacher and login account created", teacher)),
    ))
}

/// PUT /api/admin/guru/{id}
pub async fn update_teacher(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<TeacherRequest>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    state.db.run(move |conn| Teacher::update(conn, id, &req)).await?;
    Ok(Json(MessageResponse::new("Teacher and login account updated")))
}

/// DELETE /api/admin/guru/{id}
pub async fn delete_teacher(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    state.db.run(move |conn| Teacher::delete(conn, id)).await?;
    Ok(Json(MessageResponse::new("Teacher and login account deleted")))
}
