//! Persistence seams.
//!
//! Each authority owns its data behind one trait. `PgStore` implements all of
//! them on a single PostgreSQL pool; tests use the in-memory store.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, BalanceAction, CreateAccountRequest};
use crate::models::notification::{Notification, NotificationStatus};
use crate::models::report::{NewReport, Report, ReportSummary};
use crate::models::transaction::{Transaction, TransactionStatus, TransactionType};

#[cfg(test)]
pub mod memory;
pub mod postgres;

/// Transaction Ledger storage.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<(), AppError>;

    async fn insert_pending(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        amount_cents: i64,
    ) -> Result<Transaction, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Transaction>, AppError>;

    /// All transactions, newest first.
    async fn list(&self) -> Result<Vec<Transaction>, AppError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError>;

    /// Transactions still waiting for settlement, oldest first.
    async fn list_pending(&self) -> Result<Vec<Transaction>, AppError>;

    /// Write a terminal status if and only if the row is still `pending`.
    ///
    /// Returns `None` when the row is missing or already terminal.
    async fn mark_terminal(
        &self,
        id: Uuid,
        status: TransactionStatus,
        failure_reason: Option<String>,
    ) -> Result<Option<Transaction>, AppError>;
}

/// Balance Ledger storage.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(&self, request: &CreateAccountRequest) -> Result<Account, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Account>, AppError>;

    async fn list(&self) -> Result<Vec<Account>, AppError>;

    /// Atomically credit or debit one account.
    ///
    /// Mutations of the same account are serialized. A debit that would make
    /// the balance negative fails with `InsufficientFunds` and changes nothing.
    /// When `idempotency_key` was seen before, the recorded outcome is
    /// returned and nothing is applied.
    async fn mutate(
        &self,
        id: Uuid,
        action: BalanceAction,
        amount_cents: i64,
        idempotency_key: Option<&str>,
    ) -> Result<Account, AppError>;
}

/// Notification Dispatcher storage.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, user_id: Uuid, message: &str) -> Result<Notification, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, AppError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, AppError>;

    /// Every notification, newest first.
    async fn list(&self) -> Result<Vec<Notification>, AppError>;

    /// Move the notification from `from` to `sending` in one conditional
    /// write. `None` when it does not exist or is not in `from`.
    async fn claim(
        &self,
        id: Uuid,
        from: NotificationStatus,
    ) -> Result<Option<Notification>, AppError>;

    /// Store the outcome of the claimed delivery attempt and bump `attempts`.
    /// Only a `sending` notification is updated.
    async fn record_attempt(
        &self,
        id: Uuid,
        status: NotificationStatus,
        last_error: Option<String>,
    ) -> Result<Notification, AppError>;

    /// Mark every `sending` notification `failed`, for attempts cut short by
    /// a restart. Returns how many were released.
    async fn release_interrupted(&self) -> Result<u64, AppError>;
}

/// Report and summary storage.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn find_by_transaction(&self, transaction_id: Uuid) -> Result<Option<Report>, AppError>;

    /// Insert unless a report for the same transaction exists; in that case
    /// the existing row is returned untouched with `false`.
    async fn insert(&self, report: &NewReport) -> Result<(Report, bool), AppError>;

    /// Insert or refresh the snapshot of the report keyed by `transaction_id`,
    /// keeping its `id` and `created_at`.
    async fn upsert(&self, report: &NewReport) -> Result<Report, AppError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Report>, AppError>;

    /// One page ordered by `transaction_date` descending, plus the total row count.
    async fn page_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Report>, i64), AppError>;

    /// Delete every report whose transaction is not in `keep`.
    async fn delete_reports_except(&self, keep: &[Uuid]) -> Result<u64, AppError>;

    async fn get_summary(&self, user_id: Uuid) -> Result<Option<ReportSummary>, AppError>;

    async fn put_summary(&self, summary: &ReportSummary) -> Result<(), AppError>;

    /// Delete every summary whose user is not in `keep`.
    async fn delete_summaries_except(&self, keep: &[Uuid]) -> Result<u64, AppError>;
}
