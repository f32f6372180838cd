use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{state::AppState, ApiJson, DataResponse, MessageResponse, ADMIN};
use crate::auth::AuthUser;
use crate::classes::{ClassRef, ClassRequest, ClassSection};
use crate::error::AbsensiError;
use crate::students::{ClassMember, Student};

/// GET /api/admin/kelas
pub async fn list_classes(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ClassSection>>, AbsensiError> {
    user.require(ADMIN)?;
    let classes = state.db.run(|conn| ClassSection::list(conn)).await?;
    Ok(Json(classes))
}

/// POST /api/admin/kelas
pub async fn create_class(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ClassRequest>,
) -> Result<(StatusCode, Json<DataResponse<ClassRef>>), AbsensiError> {
    user.require(ADMIN)?;
    let class = state.db.run(move |conn| ClassSection::create(conn, &req)).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new("Class created", class)),
    ))
}

/// PUT /api/admin/kelas/{id}
pub async fn update_class(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ClassRequest>,
) -> Result<Json<DataResponse<ClassRef>>, AbsensiError> {
    user.require(ADMIN)?;
    let class = state
        .db
        .run(move |conn| ClassSection::update(conn, id, &req))
        .await?;
    Ok(Json(DataResponse::new("Class updated", class)))
}

/// DELETE /api/admin/kelas/{id}
pub async fn delete_class(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    state.db.run(move |conn| ClassSection::delete(conn, id)).await?;
    Ok(Json(MessageResponse::new("Class deleted")))
}

/// GET /api/admin/kelas/{id}/siswa
pub async fn list_class_students(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ClassMember>>, AbsensiError> {
    user.require(ADMIN)?;
    let members = state.db.run(move |conn| Student::list_by_class(conn, id)).await?;
    Ok(Json(members))
}
