use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{state::AppState, ApiJson, DataResponse, MessageResponse, ADMIN};
use crate::academic_years::{AcademicYear, AcademicYearRequest};
use crate::auth::AuthUser;
use crate::error::AbsensiError;

/// GET /api/admin/tahun-ajaran
pub async fn list_years(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<AcademicYear>>, AbsensiError> {
    user.require(ADMIN)?;
    let years = state.db.run(|conn| AcademicYear::list(conn)).await?;
    Ok(Json(years))
}

/// POST /api/admin/tahun-ajaran
pub async fn create_year(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<AcademicYearRequest>,
) -> Result<(StatusCode, Json<DataResponse<AcademicYear>>), AbsensiError> {
    user.require(ADMIN)?;
    let year = state
        .db
        .run(move |conn| AcademicYear::create(conn, &req.nama, req.is_active))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new("Academic year created", year)),
    ))
}

/// PUT /api/admin/tahun-ajaran/{id}
pub async fn update_year(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<AcademicYearRequest>,
) -> Result<Json<DataResponse<AcademicYear>>, AbsensiError> {
    user.require(ADMIN)?;
    let year = state
        .db
        .run(move |conn| AcademicYear::update(conn, id, &req.nama, req.is_active))
        .await?;

    Ok(Json(DataResponse::new("Academic year updated", year)))
}

/// PUT /api/admin/tahun-ajaran/activate/{id}
pub async fn activate_year(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<DataResponse<AcademicYear>>, AbsensiError> {
    user.require(ADMIN)?;
    let year = state.db.run(move |conn| AcademicYear::activate(conn, id)).await?;
    Ok(Json(DataResponse::new("Academic year activated", year)))
}

/// DELETE /api/admin/tahun-ajaran/{id}
pub async fn delete_year(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AbsensiError> {
    user.require(ADMIN)?;
    state.db.run(move |conn| AcademicYear::delete(conn, id)).await?;
    Ok(Json(MessageResponse::new("Academic year deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    fn request(nama: &str, is_active: bool) -> ApiJson<AcademicYearRequest> {
        ApiJson(AcademicYearRequest {
            nama: nama.to_string(),
            is_active,
        })
    }

    #[tokio::test]
    async fn test_create_then_activate() {
        let (_dir, state, fx) = test_state();

        let (status, Json(created)) =
            create_year(State(state.clone()), fx.admin(), request("2025/2026", false))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(!created.data.is_active);

        let Json(activated) = activate_year(
            State(state.clone()),
            fx.admin(),
            Path(created.data.academic_year_id),
        )
        .await
        .unwrap();
        assert!(activated.data.is_active);

        let Json(years) = list_years(State(state), fx.admin()).await.unwrap();
        let active: Vec<_> = years.iter().filter(|y| y.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].label, "2025/2026");
    }

    #[tokio::test]
    async fn test_duplicate_and_referenced_year() {
        let (_dir, state, fx) = test_state();

        let err = create_year(State(state.clone()), fx.admin(), request("2024/2025", false))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err = delete_year(State(state), fx.admin(), Path(fx.year_id))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
