use axum::{extract::State, Json};
use chrono::Local;

use super::state::AppState;
use crate::auth::{AuthUser, Role};
use crate::error::AbsensiError;
use crate::recap::{teacher_dashboard, TeacherDashboard};

/// GET /api/guru/dashboard
///
/// The caller's profile and, if they lead a homeroom this year, today's
/// attendance counts for that class
pub async fn get_dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TeacherDashboard>, AbsensiError> {
    user.require(&[Role::Guru])?;
    let today = Local::now().date_naive();
    let dashboard = state
        .db
        .run(move |conn| teacher_dashboard(conn, user.id, today))
        .await?;
    Ok(Json(dashboard))
}
