//! In-memory store for tests.
//!
//! Implements every store trait over `HashMap`s behind one mutex, with the
//! same semantics as the PostgreSQL store (pending-only terminal writes,
//! idempotent balance mutations, unique reports per transaction). Individual
//! operations can be made to fail with [`MemoryStore::fail_on`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, BalanceAction, CreateAccountRequest};
use crate::models::notification::{Notification, NotificationStatus};
use crate::models::report::{NewReport, Report, ReportSummary};
use crate::models::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::repository::{AccountStore, NotificationStore, ReportStore, TransactionStore};

#[derive(Default)]
struct State {
    transactions: HashMap<Uuid, Transaction>,
    accounts: HashMap<Uuid, Account>,
    mutations: HashMap<String, bool>,
    notifications: HashMap<Uuid, Notification>,
    reports: HashMap<Uuid, Report>,
    summaries: HashMap<Uuid, ReportSummary>,
    failing: HashSet<&'static str>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named operation fail with a persistence error from now on.
    pub fn fail_on(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().failing.clear();
    }

    /// Open an account with a fixed id.
    pub fn seed_account(&self, id: Uuid, full_name: &str, balance_cents: i64) -> Account {
        let now = Utc::now();
        let account = Account {
            id,
            full_name: full_name.to_string(),
            email: format!("{}@example.com", full_name.to_lowercase().replace(' ', ".")),
            balance_cents,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().accounts.insert(id, account.clone());
        account
    }

    pub fn balance_of(&self, id: Uuid) -> Option<i64> {
        self.state.lock().unwrap().accounts.get(&id).map(|a| a.balance_cents)
    }

    pub fn report_count(&self) -> usize {
        self.state.lock().unwrap().reports.len()
    }

    pub fn summary_count(&self) -> usize {
        self.state.lock().unwrap().summaries.len()
    }

    fn check(state: &State, operation: &'static str) -> Result<(), AppError> {
        if state.failing.contains(operation) {
            return Err(AppError::Persistence(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        let state = self.state.lock().unwrap();
        Self::check(&state, "ping")
    }

    async fn insert_pending(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        amount_cents: i64,
    ) -> Result<Transaction, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "insert_pending")?;
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            transaction_type,
            amount_cents,
            status: TransactionStatus::Pending,
            failure_reason: None,
            created_at: Utc::now(),
            settled_at: None,
        };
        state.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        Ok(self.state.lock().unwrap().transactions.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Transaction>, AppError> {
        let state = self.state.lock().unwrap();
        Self::check(&state, "list_transactions")?;
        let mut all: Vec<_> = state.transactions.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        let mut all = TransactionStore::list(self).await?;
        all.retain(|t| t.user_id == user_id);
        Ok(all)
    }

    async fn list_pending(&self) -> Result<Vec<Transaction>, AppError> {
        let mut all = TransactionStore::list(self).await?;
        all.retain(|t| t.status == TransactionStatus::Pending);
        all.reverse();
        Ok(all)
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        status: TransactionStatus,
        failure_reason: Option<String>,
    ) -> Result<Option<Transaction>, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "mark_terminal")?;
        match state.transactions.get_mut(&id) {
            Some(t) if t.status == TransactionStatus::Pending => {
                t.status = status;
                t.failure_reason = failure_reason;
                t.settled_at = Some(Utc::now());
                Ok(Some(t.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create(&self, request: &CreateAccountRequest) -> Result<Account, AppError> {
        let mut state = self.state.lock().unwrap();
        let email = request.email.trim().to_lowercase();
        if state.accounts.values().any(|a| a.email == email) {
            return Err(AppError::Validation("Email already exists".to_string()));
        }
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            full_name: request.full_name.trim().to_string(),
            email,
            balance_cents: request.initial_balance_cents,
            created_at: now,
            updated_at: now,
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.state.lock().unwrap().accounts.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>, AppError> {
        let state = self.state.lock().unwrap();
        Self::check(&state, "list_accounts")?;
        let mut all: Vec<_> = state.accounts.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn mutate(
        &self,
        id: Uuid,
        action: BalanceAction,
        amount_cents: i64,
        idempotency_key: Option<&str>,
    ) -> Result<Account, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "mutate")?;
        let current = state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("account {id}")))?;

        if let Some(applied) = idempotency_key.and_then(|k| state.mutations.get(k).copied()) {
            return if applied {
                Ok(current)
            } else {
                Err(AppError::InsufficientFunds)
            };
        }

        let new_balance = match action {
            BalanceAction::Credit => current.balance_cents.checked_add(amount_cents),
            BalanceAction::Debit => current.balance_cents.checked_sub(amount_cents),
        }
        .ok_or_else(|| AppError::Validation("Balance overflow".to_string()))?;
        let applied = new_balance >= 0;
        if let Some(key) = idempotency_key {
            state.mutations.insert(key.to_string(), applied);
        }
        if !applied {
            return Err(AppError::InsufficientFunds);
        }

        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("account {id}")))?;
        account.balance_cents = new_balance;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, user_id: Uuid, message: &str) -> Result<Notification, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "insert_notification")?;
        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            message: message.to_string(),
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        state.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, AppError> {
        Ok(self.state.lock().unwrap().notifications.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, AppError> {
        let state = self.state.lock().unwrap();
        let mut all: Vec<_> = state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list(&self) -> Result<Vec<Notification>, AppError> {
        let state = self.state.lock().unwrap();
        let mut all: Vec<_> = state.notifications.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn claim(
        &self,
        id: Uuid,
        from: NotificationStatus,
    ) -> Result<Option<Notification>, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "claim")?;
        Ok(state
            .notifications
            .get_mut(&id)
            .filter(|n| n.status == from)
            .map(|n| {
                n.status = NotificationStatus::Sending;
                n.updated_at = Utc::now();
                n.clone()
            }))
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        status: NotificationStatus,
        last_error: Option<String>,
    ) -> Result<Notification, AppError> {
        let mut state = self.state.lock().unwrap();
        let notification = state
            .notifications
            .get_mut(&id)
            .filter(|n| n.status == NotificationStatus::Sending)
            .ok_or_else(|| {
                AppError::NotFound(format!("delivery attempt of notification {id}"))
            })?;
        notification.status = status;
        notification.last_error = last_error;
        notification.attempts += 1;
        notification.updated_at = Utc::now();
        Ok(notification.clone())
    }

    async fn release_interrupted(&self) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let mut released = 0;
        for notification in state.notifications.values_mut() {
            if notification.status == NotificationStatus::Sending {
                notification.status = NotificationStatus::Failed;
                notification.last_error = Some("delivery interrupted".to_string());
                notification.attempts += 1;
                notification.updated_at = Utc::now();
                released += 1;
            }
        }
        Ok(released)
    }
}

fn materialize(report: &NewReport, id: Uuid, created_at: chrono::DateTime<Utc>) -> Report {
    Report {
        id,
        user_id: report.user_id,
        transaction_id: report.transaction_id,
        full_name: report.full_name.clone(),
        email: report.email.clone(),
        transaction_type: report.transaction_type,
        amount_cents: report.amount_cents,
        transaction_status: report.transaction_status,
        balance_after_cents: report.balance_after_cents,
        transaction_date: report.transaction_date,
        created_at,
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn find_by_transaction(&self, transaction_id: Uuid) -> Result<Option<Report>, AppError> {
        Ok(self.state.lock().unwrap().reports.get(&transaction_id).cloned())
    }

    async fn insert(&self, report: &NewReport) -> Result<(Report, bool), AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "insert_report")?;
        if let Some(existing) = state.reports.get(&report.transaction_id) {
            return Ok((existing.clone(), false));
        }
        let stored = materialize(report, Uuid::new_v4(), Utc::now());
        state.reports.insert(report.transaction_id, stored.clone());
        Ok((stored, true))
    }

    async fn upsert(&self, report: &NewReport) -> Result<Report, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "upsert_report")?;
        let (id, created_at) = state
            .reports
            .get(&report.transaction_id)
            .map(|r| (r.id, r.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), Utc::now()));
        let stored = materialize(report, id, created_at);
        state.reports.insert(report.transaction_id, stored.clone());
        Ok(stored)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Report>, AppError> {
        let state = self.state.lock().unwrap();
        Self::check(&state, "list_reports")?;
        let mut all: Vec<_> = state
            .reports
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| {
            b.transaction_date
                .cmp(&a.transaction_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(all)
    }

    async fn page_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Report>, i64), AppError> {
        let all = ReportStore::list_for_user(self, user_id).await?;
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn delete_reports_except(&self, keep: &[Uuid]) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "delete_reports")?;
        let before = state.reports.len();
        state.reports.retain(|transaction_id, _| keep.contains(transaction_id));
        Ok((before - state.reports.len()) as u64)
    }

    async fn get_summary(&self, user_id: Uuid) -> Result<Option<ReportSummary>, AppError> {
        Ok(self.state.lock().unwrap().summaries.get(&user_id).cloned())
    }

    async fn put_summary(&self, summary: &ReportSummary) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "put_summary")?;
        state.summaries.insert(summary.user_id, summary.clone());
        Ok(())
    }

    async fn delete_summaries_except(&self, keep: &[Uuid]) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "delete_summaries")?;
        let before = state.summaries.len();
        state.summaries.retain(|user_id, _| keep.contains(user_id));
        Ok((before - state.summaries.len()) as u64)
    }
}
