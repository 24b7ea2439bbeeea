//! Notification models and delivery payload.
//!
//! # Notification Flow
//!
//! 1. A settlement (or any internal caller) creates a notification via `POST /notifications`
//! 2. The dispatcher delivers it over the configured channel (`send`)
//! 3. A failed delivery can be retried explicitly (`resend`)
//!
//! # Signature
//!
//! Webhook deliveries carry an `X-Notification-Signature: sha256=<hex>` header,
//! the HMAC-SHA256 of the JSON body under the shared webhook secret.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    /// Claimed by one delivery attempt; no other send or resend may start
    Sending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sending => "sending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sending" => Ok(NotificationStatus::Sending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(AppError::Validation(format!(
                "Unknown notification status: {other}"
            ))),
        }
    }
}

/// A message addressed to a user.
///
/// `attempts` counts delivery attempts; `last_error` keeps the reason of the
/// most recent failed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub status: NotificationStatus,
    pub attempts: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a notification.
///
/// # Example
///
/// ```json
/// {
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "message": "Top-up of 50.00 succeeded."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    pub message: String,
}

impl CreateNotificationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.message.trim().is_empty() {
            return Err(AppError::Validation(
                "user_id and message are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Body POSTed to the notification webhook.
///
/// # Example
///
/// ```json
/// {
///   "event_type": "notification.created",
///   "notification_id": "550e8400-e29b-41d4-a716-446655440000",
///   "user_id": "660e8400-e29b-41d4-a716-446655440001",
///   "message": "Debit of 150.00 failed: insufficient funds.",
///   "sent_at": "2025-01-15T10:30:00Z"
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub event_type: String,
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

impl DeliveryPayload {
    pub fn new(notification: &Notification) -> Self {
        Self {
            event_type: "notification.created".to_string(),
            notification_id: notification.id,
            user_id: notification.user_id,
            message: notification.message.clone(),
            sent_at: Utc::now(),
        }
    }
}
