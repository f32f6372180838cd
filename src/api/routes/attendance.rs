use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Local;
use serde::{Deserialize, Serialize};

use super::{state::AppState, ApiJson, STAFF};
use crate::attendance::{record_check_in, CheckIn, CheckInOutcome};
use crate::auth::AuthUser;
use crate::error::AbsensiError;
use crate::export;
use crate::recap::{get_analytics, get_recap, AnalyticsPoint, RecapFilter, RecapParams, RecapRow};

/// Body of POST /api/absensi/scan. Older scanner builds send the decoded QR
/// text as `qr_uuid` or `qr_content`.
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default, alias = "qr_uuid", alias = "qr_content")]
    pub nisn: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub status: &'static str,
    pub message: String,
    pub siswa: String,
    pub kelas: String,
    /// Local wall-clock time of the check-in, HH:MM:SS
    pub waktu: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl ScanResponse {
    fn recorded(check_in: CheckIn) -> Self {
        ScanResponse {
            status: "success",
            message: format!("Check-in recorded. Welcome, {}.", check_in.student.full_name),
            waktu: check_in.checked_in_at.format("%H:%M:%S").to_string(),
            siswa: check_in.student.full_name,
            kelas: check_in.student.class_name,
            success: None,
        }
    }

    fn already_scanned(check_in: CheckIn) -> Self {
        let waktu = check_in.checked_in_at.format("%H:%M:%S").to_string();
        ScanResponse {
            status: "already_scanned",
            message: format!("Already checked in today at {}.", waktu),
            waktu,
            siswa: check_in.student.full_name,
            kelas: check_in.student.class_name,
            success: Some(false),
        }
    }
}

/// POST /api/absensi/scan
pub async fn scan(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ScanRequest>,
) -> Result<(StatusCode, Json<ScanResponse>), AbsensiError> {
    user.require(STAFF)?;

    let identifier = req.nisn.unwrap_or_default();
    let outcome = state
        .db
        .run(move |conn| record_check_in(conn, &identifier, Local::now()))
        .await?;

    match outcome {
        CheckInOutcome::Recorded(check_in) => {
            Ok((StatusCode::CREATED, Json(ScanResponse::recorded(check_in))))
        }
        CheckInOutcome::AlreadyScanned(check_in) => Ok((
            StatusCode::CONFLICT,
            Json(ScanResponse::already_scanned(check_in)),
        )),
        CheckInOutcome::StudentNotFound => Err(AbsensiError::NotFound(
            "Student is not registered in the active academic year".to_string(),
        )),
    }
}

async fn load_recap(state: &AppState, params: RecapParams) -> Result<(RecapFilter, Vec<RecapRow>), AbsensiError> {
    let filter = RecapFilter::from_params(&params)?;
    let rows = state.db.run(move |conn| get_recap(conn, &filter)).await?;
    Ok((filter, rows))
}

/// GET /api/absensi/recap
pub async fn recap(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<RecapParams>,
) -> Result<Json<Vec<RecapRow>>, AbsensiError> {
    user.require(STAFF)?;
    let (_, rows) = load_recap(&state, params).await?;
    Ok(Json(rows))
}

/// GET /api/absensi/analytics
pub async fn analytics(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<RecapParams>,
) -> Result<Json<Vec<AnalyticsPoint>>, AbsensiError> {
    user.require(STAFF)?;
    let filter = RecapFilter::from_params(&params)?;
    let points = state.db.run(move |conn| get_analytics(conn, &filter)).await?;
    Ok(Json(points))
}

/// GET /api/absensi/export
///
/// The recap as a CSV attachment
pub async fn export_csv(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<RecapParams>,
) -> Result<Response, AbsensiError> {
    user.require(STAFF)?;
    let (filter, rows) = load_recap(&state, params).await?;
    let body = export::recap_to_csv(&rows)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export::file_name(&filter)),
            ),
        ],
        body,
    )
        .into_response())
}
