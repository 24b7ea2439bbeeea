//! Notification delivery channels.
//!
//! A channel pushes one notification to the outside world and reports
//! whether it got there. It never touches notification state; the
//! dispatcher records the outcome.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;
use crate::models::notification::{DeliveryPayload, Notification};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Notification-Signature";
pub const NOTIFICATION_ID_HEADER: &str = "X-Notification-Id";

/// Delivery failure with a human-readable reason, stored as `last_error`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryError(pub String);

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Signed HTTP POST to a configured endpoint.
///
/// # Headers Sent
///
/// - `Content-Type: application/json`
/// - `X-Notification-Signature: sha256=<hex>`
/// - `X-Notification-Id: <uuid>`
///
/// Any non-2xx status or transport error is a failed delivery.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl WebhookChannel {
    pub fn new(url: &str, secret: &str, timeout: Duration) -> Result<Self, AppError> {
        validate_webhook_url(url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Validation(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            secret: secret.to_string(),
        })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let payload = DeliveryPayload::new(notification);
        let body = serde_json::to_string(&payload)
            .map_err(|e| DeliveryError(format!("Failed to serialize payload: {e}")))?;
        let signature = generate_signature(&self.secret, &body)
            .map_err(|e| DeliveryError(format!("Failed to sign payload: {e}")))?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(NOTIFICATION_ID_HEADER, notification.id.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError(format!("Request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError(format!("Webhook responded with {status}")))
        }
    }
}

/// Writes the notification to the log. Used when no webhook is configured.
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            message = %notification.message,
            "notification delivered"
        );
        Ok(())
    }
}

/// HMAC-SHA256 of `payload` under `secret`, formatted `sha256=<hex>`.
///
/// Receivers recompute the HMAC over the raw body and compare in constant time.
pub fn generate_signature(
    secret: &str,
    payload: &str,
) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Validate the webhook URL.
///
/// # Rules
///
/// - Must be a valid URL, at most 2048 characters
/// - Must be HTTPS (HTTP allowed for localhost during development)
pub fn validate_webhook_url(url: &str) -> Result<(), AppError> {
    if url.len() > 2048 {
        return Err(AppError::Validation(
            "Webhook URL exceeds 2048 characters".to_string(),
        ));
    }

    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::Validation("Invalid webhook URL format".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" if matches!(
            parsed.host_str(),
            Some("localhost" | "127.0.0.1" | "0.0.0.0")
        ) =>
        {
            Ok(())
        }
        "http" => Err(AppError::Validation(
            "HTTP is only allowed for localhost. Use HTTPS for production.".to_string(),
        )),
        _ => Err(AppError::Validation(
            "Webhook URL must use HTTP or HTTPS".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_prefixed_hex_hmac() {
        let signature = generate_signature("secret", "{}").unwrap();
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), "sha256=".len() + 64);
        assert_eq!(signature, generate_signature("secret", "{}").unwrap());
        assert_ne!(signature, generate_signature("other", "{}").unwrap());
    }

    #[test]
    fn webhook_url_rules() {
        assert!(validate_webhook_url("https://hooks.example.com/n").is_ok());
        assert!(validate_webhook_url("http://localhost:9000/hook").is_ok());
        assert!(validate_webhook_url("http://hooks.example.com/n").is_err());
        assert!(validate_webhook_url("ftp://hooks.example.com").is_err());
        assert!(validate_webhook_url("not a url").is_err());
    }

    #[tokio::test]
    async fn unreachable_webhook_is_a_failed_delivery() {
        let timeout = Duration::from_millis(500);
        let channel = WebhookChannel::new("http://127.0.0.1:9/hook", "s", timeout).unwrap();
        let notification = Notification {
            id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            message: "hello".to_string(),
            status: crate::models::notification::NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let err = channel.deliver(&notification).await.unwrap_err();
        assert!(err.0.starts_with("Request failed"));
    }
}
