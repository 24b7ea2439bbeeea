//! Collaborator contracts consumed by the settlement and reporting core.
//!
//! Each contract has an in-process implementation (the local service) and an
//! HTTP implementation in [`http`], chosen at startup from the configuration.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, BalanceAction};
use crate::models::notification::Notification;

pub mod http;

/// Header carrying the shared internal credential.
pub const SERVICE_TOKEN_HEADER: &str = "X-Service-Token";

/// The Balance Ledger as seen by its consumers.
///
/// Implementations are expected to serialize mutations per user; the core
/// does not enforce that itself.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// `NotFound` when the user has no account.
    async fn get_account(&self, user_id: Uuid) -> Result<Account, AppError>;

    /// The full user directory.
    async fn list_accounts(&self) -> Result<Vec<Account>, AppError>;

    /// Credit or debit `amount_cents`.
    ///
    /// Fails with `InsufficientFunds`, `NotFound`, or an upstream error. A
    /// repeated call with the same `idempotency_key` is not applied twice.
    async fn mutate(
        &self,
        user_id: Uuid,
        action: BalanceAction,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> Result<Account, AppError>;
}

/// The Notification Dispatcher as seen by the settlement worker.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Create a notification for the user. Delivery happens separately.
    async fn notify(&self, user_id: Uuid, message: &str) -> Result<Notification, AppError>;
}
