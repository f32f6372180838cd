use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Local;
use serde::Deserialize;

use super::{state::AppState, ADMIN};
use crate::attendance::{log_for_date, parse_date, AttendanceLogEntry};
use crate::auth::AuthUser;
use crate::error::AbsensiError;
use crate::recap::{
    dashboard_stats, get_recap, weekly_trend, DashboardStats, RecapFilter, RecapParams, RecapRow,
    TrendPoint,
};

#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    /// Day to list, YYYY-MM-DD. Defaults to today.
    pub tanggal: Option<String>,
}

/// GET /api/admin/dashboard-stats
pub async fn get_dashboard_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DashboardStats>, AbsensiError> {
    user.require(ADMIN)?;
    let today = Local::now().date_naive();
    let stats = state.db.run(move |conn| dashboard_stats(conn, today)).await?;
    Ok(Json(stats))
}

/// GET /api/admin/rekap/trend
///
/// Present percentage for each of the last seven days
pub async fn get_trend(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<TrendPoint>>, AbsensiError> {
    user.require(ADMIN)?;
    let today = Local::now().date_naive();
    let trend = state.db.run(move |conn| weekly_trend(conn, today)).await?;
    Ok(Json(trend))
}

/// GET /api/admin/kehadiran
pub async fn get_attendance_log(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<LogParams>,
) -> Result<Json<Vec<AttendanceLogEntry>>, AbsensiError> {
    user.require(ADMIN)?;
    let date = match params.tanggal.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => parse_date(date)?,
        None => Local::now().date_naive(),
    };
    let entries = state.db.run(move |conn| log_for_date(conn, date)).await?;
    Ok(Json(entries))
}

/// GET /api/admin/rekap
pub async fn get_admin_recap(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<RecapParams>,
) -> Result<Json<Vec<RecapRow>>, AbsensiError> {
    user.require(ADMIN)?;
    let filter = RecapFilter::from_params(&params)?;
    let rows = state.db.run(move |conn| get_recap(conn, &filter)).await?;
    Ok(Json(rows))
}
