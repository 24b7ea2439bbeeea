//! Notification Dispatcher.
//!
//! # State Machine
//!
//! ```text
//! pending --send--> sending --> sent | failed
//! failed --resend--> sending --> sent | failed
//! ```
//!
//! `send` only accepts `pending` and `resend` only accepts `failed`; anything
//! else is `InvalidNotificationState`. The move to `sending` is a single
//! conditional write, so of two concurrent attempts on one notification only
//! one delivers. A failed delivery is not an error for the caller: it is
//! recorded on the notification and returned.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::clients::Notifier;
use crate::error::AppError;
use crate::models::notification::{CreateNotificationRequest, Notification, NotificationStatus};
use crate::repository::NotificationStore;
use crate::services::delivery::DeliveryChannel;

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    channel: Arc<dyn DeliveryChannel>,
    auto_send: bool,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        channel: Arc<dyn DeliveryChannel>,
        auto_send: bool,
    ) -> Self {
        Self {
            store,
            channel,
            auto_send,
        }
    }

    /// Store a `pending` notification.
    ///
    /// With auto-send enabled, delivery starts on a background task and the
    /// stored notification is returned without waiting for it.
    pub async fn create(
        &self,
        request: CreateNotificationRequest,
    ) -> Result<Notification, AppError> {
        request.validate()?;
        let notification = self.store.insert(request.user_id, &request.message).await?;
        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            "notification created"
        );

        if self.auto_send {
            let service = self.clone();
            let id = notification.id;
            tokio::spawn(async move {
                if let Err(e) = service.send(id).await {
                    tracing::warn!(notification_id = %id, error = %e, "auto-send failed");
                }
            });
        }

        Ok(notification)
    }

    pub async fn get(&self, id: Uuid) -> Result<Notification, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("notification {id}")))
    }

    /// All notifications of a user, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, AppError> {
        self.store.list_for_user(user_id).await
    }

    /// Every notification, newest first.
    pub async fn list(&self) -> Result<Vec<Notification>, AppError> {
        self.store.list().await
    }

    /// First delivery attempt of a `pending` notification.
    pub async fn send(&self, id: Uuid) -> Result<Notification, AppError> {
        let notification = self.claim(id, NotificationStatus::Pending, "send").await?;
        self.deliver(&notification).await
    }

    /// Another delivery attempt of a `failed` notification.
    pub async fn resend(&self, id: Uuid) -> Result<Notification, AppError> {
        let notification = self.claim(id, NotificationStatus::Failed, "resend").await?;
        self.deliver(&notification).await
    }

    /// Fail attempts a previous run left in `sending` so they can be resent.
    pub async fn release_interrupted(&self) -> Result<u64, AppError> {
        let released = self.store.release_interrupted().await?;
        if released > 0 {
            tracing::warn!(released, "interrupted deliveries marked failed");
        }
        Ok(released)
    }

    async fn claim(
        &self,
        id: Uuid,
        from: NotificationStatus,
        action: &'static str,
    ) -> Result<Notification, AppError> {
        match self.store.claim(id, from).await? {
            Some(notification) => Ok(notification),
            None => Err(AppError::InvalidNotificationState {
                action,
                current: self.get(id).await?.status,
            }),
        }
    }

    async fn deliver(&self, notification: &Notification) -> Result<Notification, AppError> {
        match self.channel.deliver(notification).await {
            Ok(()) => {
                self.store
                    .record_attempt(notification.id, NotificationStatus::Sent, None)
                    .await
            }
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    error = %e.0,
                    "notification delivery failed"
                );
                self.store
                    .record_attempt(notification.id, NotificationStatus::Failed, Some(e.0))
                    .await
            }
        }
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(&self, user_id: Uuid, message: &str) -> Result<Notification, AppError> {
        self.create(CreateNotificationRequest {
            user_id,
            message: message.to_string(),
        })
        .await
    }
}
