//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::models::notification::NotificationStatus;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code.
///
/// # Error Categories
///
/// - **Validation Errors**: malformed or missing fields, non-positive amounts
/// - **Resource Errors**: user, transaction, report or notification absent
/// - **Business Rule Errors**: insufficient funds, illegal notification transitions
/// - **Upstream Errors**: a collaborator service was unreachable, timed out or misbehaved
/// - **Persistence Errors**: any sqlx::Error from local storage
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Local storage failed (connection error, query error, constraint violation).
    ///
    /// The in-flight sqlx transaction is rolled back when it is dropped.
    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("{0}")]
    Validation(String),

    /// Internal service credential is missing or wrong.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid service token")]
    Unauthorized,

    /// A resource is absent. The String names what was missing.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("{0} not found")]
    NotFound(String),

    /// The debit would take the balance below zero.
    ///
    /// Returns HTTP 422 Unprocessable Entity with its own code.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// Send or resend attempted from a state that does not allow it.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Cannot {action} a notification in status {current}")]
    InvalidNotificationState {
        action: &'static str,
        current: NotificationStatus,
    },

    /// Another reconciliation run holds the guard.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("A reconciliation run is already in progress")]
    SyncInProgress,

    /// A collaborator could not be reached or timed out. Never retried.
    ///
    /// Returns HTTP 503 Service Unavailable.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A collaborator answered with something the contract does not allow.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl AppError {
    /// Stable machine-readable code, also used to recognise errors coming
    /// back from a remote collaborator.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Persistence(_) => "internal_error",
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::InsufficientFunds => "insufficient_funds",
            AppError::InvalidNotificationState { .. } => "invalid_notification_state",
            AppError::SyncInProgress => "sync_in_progress",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::Upstream(_) => "upstream_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidNotificationState { .. } | AppError::SyncInProgress => {
                StatusCode::CONFLICT
            }
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Persistence errors hide their details from the client and are logged instead.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Persistence(e) => {
                tracing::error!("Persistence failure: {:?}", e);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message
            }
        }));

        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_funds_has_its_own_code() {
        let err = AppError::InsufficientFunds;
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "insufficient_funds");
        assert_ne!(err.code(), AppError::Validation(String::new()).code());
    }

    #[test]
    fn not_found_names_the_missing_resource() {
        let err = AppError::NotFound("transaction 42".to_string());
        assert_eq!(err.to_string(), "transaction 42 not found");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn persistence_errors_are_server_faults() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
