use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{state::AppState, ApiJson, DataResponse, MessageResponse, ADMIN};
use crate::auth::AuthUser;
use crate::error::AbsensiError;
use crate::students::{Student, StudentRequest};

/// GET /api/admin/siswa
pub async fn list_students(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Student>>, AbsensiError> {
    user.require(ADMIN)?;
    let students = state.db.run(|conn| Student::list(conn)).await?;
    Ok(Json(students))
}

/// POST /api/admin/siswa
///
/// Enrolls the student in the active year and creates their login
pub async fn create_student(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<StudentRequest>,
) -> Result<(StatusCode, Json<DataResponse<Student>>), AbsensiError> {
    user.require(ADMIN)?;
    let student = state
        .db
        .run(move |conn| {
            let student_id = Student::create(conn, &req)?;
            Student::get_by_id(conn, student_id)?
                .ok_or_else(|| AbsensiError::Error("Created student vanished".to_string()))
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new("Student and login account created", student)),
    ))
}

/// PUT /api/admin/siswa/{id}
pub async fn update_student(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<StudentRequest>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    state.db.run(move |conn| Student::update(conn, id, &req)).await?;
    Ok(Json(MessageResponse::new("Student updated")))
}

/// DELETE /api/admin/siswa/{id}
pub async fn delete_student(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    state.db.run(move |conn| Student::delete(conn, id)).await?;
    Ok(Json(MessageResponse::new("Student and related data deleted")))
}
