//! Report and summary models.
//!
//! A `Report` is a denormalized, point-in-time snapshot of one transaction
//! joined with its owner. A `ReportSummary` is derived from all reports of a
//! user and is never authoritative on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::Account;
use crate::models::transaction::{Transaction, TransactionStatus, TransactionType};

/// One row per transaction, unique on `transaction_id`.
///
/// The snapshot fields (`amount_cents`, `transaction_status`,
/// `balance_after_cents`, `transaction_date`, name and email) are captured at
/// creation and only refreshed by an explicit reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_id: Uuid,
    pub full_name: String,
    pub email: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount_cents: i64,
    pub transaction_status: TransactionStatus,
    pub balance_after_cents: i64,
    pub transaction_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Report contents before the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub user_id: Uuid,
    pub transaction_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub transaction_type: TransactionType,
    pub amount_cents: i64,
    pub transaction_status: TransactionStatus,
    pub balance_after_cents: i64,
    pub transaction_date: DateTime<Utc>,
}

impl NewReport {
    /// Capture a transaction and its owner's account as they are right now.
    pub fn snapshot(account: &Account, transaction: &Transaction) -> Self {
        Self {
            user_id: account.id,
            transaction_id: transaction.id,
            full_name: account.full_name.clone(),
            email: account.email.clone(),
            transaction_type: transaction.transaction_type,
            amount_cents: transaction.amount_cents,
            transaction_status: transaction.status,
            balance_after_cents: account.balance_cents,
            transaction_date: transaction.created_at,
        }
    }
}

/// Rolling per-user aggregate over all of the user's reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub total_transactions: i64,
    pub total_credit_cents: i64,
    pub total_debit_cents: i64,
    pub current_balance_cents: i64,
    pub last_transaction_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ReportSummary {
    /// Full-scan recompute from every report of the user.
    ///
    /// `current_balance_cents` comes from the live account, not from the reports.
    ///
    /// # Errors
    ///
    /// - `Validation`: a total does not fit in an `i64`
    pub fn compute(
        account: &Account,
        reports: &[Report],
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let mut total_credit_cents: i64 = 0;
        let mut total_debit_cents: i64 = 0;
        for report in reports {
            let total = match report.transaction_type {
                TransactionType::Credit => &mut total_credit_cents,
                TransactionType::Debit => &mut total_debit_cents,
            };
            *total = total.checked_add(report.amount_cents).ok_or_else(|| {
                AppError::Validation(format!(
                    "Summary totals of user {} overflow",
                    account.id
                ))
            })?;
        }

        Ok(Self {
            user_id: account.id,
            full_name: account.full_name.clone(),
            email: account.email.clone(),
            total_transactions: reports.len() as i64,
            total_credit_cents,
            total_debit_cents,
            current_balance_cents: account.balance_cents,
            last_transaction_date: reports.iter().map(|r| r.transaction_date).max(),
            updated_at: now,
        })
    }

    /// True when every derived value matches, ignoring `updated_at`.
    pub fn same_content(&self, other: &ReportSummary) -> bool {
        self.user_id == other.user_id
            && self.full_name == other.full_name
            && self.email == other.email
            && self.total_transactions == other.total_transactions
            && self.total_credit_cents == other.total_credit_cents
            && self.total_debit_cents == other.total_debit_cents
            && self.current_balance_cents == other.current_balance_cents
            && self.last_transaction_date == other.last_transaction_date
    }
}

/// Query string of `GET /reports/user/{user_id}`.
#[derive(Debug, Default, Deserialize)]
pub struct ReportPageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// One page of a user's reports, newest transaction first.
#[derive(Debug, Serialize)]
pub struct ReportPage {
    pub data: Vec<Report>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: i64,
}

/// Request body of `POST /reports`.
#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub user_id: Uuid,
    pub transaction_id: Uuid,
}

/// Result of a full reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub synced_reports: usize,
    pub synced_users: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(balance_cents: i64) -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            full_name: "Dewi Lestari".to_string(),
            email: "dewi@example.com".to_string(),
            balance_cents,
            created_at: now,
            updated_at: now,
        }
    }

    fn report(
        owner: &Account,
        transaction_type: TransactionType,
        amount_cents: i64,
        days_ago: i64,
    ) -> Report {
        let now = Utc::now();
        Report {
            id: Uuid::new_v4(),
            user_id: owner.id,
            transaction_id: Uuid::new_v4(),
            full_name: owner.full_name.clone(),
            email: owner.email.clone(),
            transaction_type,
            amount_cents,
            transaction_status: TransactionStatus::Success,
            balance_after_cents: owner.balance_cents,
            transaction_date: now - Duration::days(days_ago),
            created_at: now,
        }
    }

    #[test]
    fn totals_partition_the_report_amounts() {
        let owner = account(7_000);
        let reports = vec![
            report(&owner, TransactionType::Credit, 5_000, 3),
            report(&owner, TransactionType::Debit, 1_500, 2),
            report(&owner, TransactionType::Credit, 2_500, 1),
        ];

        let summary = ReportSummary::compute(&owner, &reports, Utc::now()).unwrap();

        let sum: i64 = reports.iter().map(|r| r.amount_cents).sum();
        assert_eq!(summary.total_credit_cents + summary.total_debit_cents, sum);
        assert_eq!(summary.total_transactions, 3);
        assert_eq!(summary.total_credit_cents, 7_500);
        assert_eq!(summary.total_debit_cents, 1_500);
        assert_eq!(summary.current_balance_cents, 7_000);
        assert_eq!(summary.last_transaction_date, Some(reports[2].transaction_date));
    }

    #[test]
    fn empty_history_yields_zero_summary() {
        let owner = account(100);
        let summary = ReportSummary::compute(&owner, &[], Utc::now()).unwrap();
        assert_eq!(summary.total_transactions, 0);
        assert_eq!(summary.last_transaction_date, None);
        assert_eq!(summary.current_balance_cents, 100);
    }

    #[test]
    fn same_content_ignores_updated_at() {
        let owner = account(100);
        let a = ReportSummary::compute(&owner, &[], Utc::now()).unwrap();
        let b = ReportSummary::compute(&owner, &[], Utc::now() + Duration::seconds(30)).unwrap();
        assert!(a.same_content(&b));

        let richer = account(200);
        let c = ReportSummary {
            current_balance_cents: richer.balance_cents,
            ..a.clone()
        };
        assert!(!a.same_content(&c));
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let owner = account(0);
        let reports = vec![
            report(&owner, TransactionType::Credit, i64::MAX, 2),
            report(&owner, TransactionType::Credit, i64::MAX, 1),
        ];

        let err = ReportSummary::compute(&owner, &reports, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Each side is checked on its own
        let mixed = vec![
            report(&owner, TransactionType::Credit, i64::MAX, 2),
            report(&owner, TransactionType::Debit, i64::MAX, 1),
        ];
        let summary = ReportSummary::compute(&owner, &mixed, Utc::now()).unwrap();
        assert_eq!(summary.total_credit_cents, i64::MAX);
        assert_eq!(summary.total_debit_cents, i64::MAX);
    }
}
