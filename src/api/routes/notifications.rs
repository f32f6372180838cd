use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use super::{state::AppState, ApiJson, STAFF};
use crate::auth::AuthUser;
use crate::error::AbsensiError;
use crate::notifications::{BroadcastRequest, BroadcastResult, CreateNotificationRequest, Notification};

/// POST /api/notifications
pub async fn create_notification(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), AbsensiError> {
    user.require(STAFF)?;
    let recipient = req
        .user_id
        .ok_or_else(|| AbsensiError::Validation("userId and title are required".to_string()))?;

    let notification = state
        .db
        .run(move |conn| Notification::create(conn, recipient, &req.title, &req.body, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// GET /api/notifications
pub async fn list_my_notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Notification>>, AbsensiError> {
    let notifications = state
        .db
        .run(move |conn| Notification::list_for_user(conn, user.id))
        .await?;
    Ok(Json(notifications))
}

/// PUT /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, AbsensiError> {
    let notification = state
        .db
        .run(move |conn| Notification::mark_read(conn, id, user.id))
        .await?;
    Ok(Json(notification))
}

/// POST /api/notifications/broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<BroadcastRequest>,
) -> Result<(StatusCode, Json<BroadcastResult>), AbsensiError> {
    user.require(STAFF)?;
    let result = state
        .db
        .run(move |conn| Notification::broadcast_to_students(conn, &req.title, &req.body, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}
