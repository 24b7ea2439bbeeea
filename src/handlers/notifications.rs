//! Notification Dispatcher HTTP handlers (internal).
//!
//! - POST /notifications - Create a pending notification
//! - GET /notifications - All notifications, newest first
//! - GET /notifications/{id}
//! - GET /notifications/user/{user_id}
//! - POST /notifications/{id}/send - First delivery attempt
//! - POST /notifications/{id}/resend - Retry a failed delivery

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::notification::{CreateNotificationRequest, Notification},
    state::AppState,
};

/// # Response (201 Created)
///
/// The stored notification with `"status": "pending"`.
pub async fn create_notification(
    State(state): State<AppState>,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    let notification = state.notifications.create(request).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

pub async fn list_notifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(state.notifications.list().await?))
}

pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.notifications.get(id).await?))
}

pub async fn list_user_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(state.notifications.list_for_user(user_id).await?))
}

/// Deliver a pending notification.
///
/// A failed delivery still answers 200; the body carries
/// `"status": "failed"` and `last_error`. Any status other than `pending`
/// is rejected with 409 `invalid_notification_state`.
pub async fn send_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.notifications.send(id).await?))
}

/// Retry a failed notification. Any other status is rejected with 409.
pub async fn resend_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.notifications.resend(id).await?))
}
