//! Report Aggregator.
//!
//! Builds per-transaction snapshot reports and keeps a per-user summary
//! derived from them.
//!
//! # Idempotency
//!
//! Reports are keyed by `transaction_id`. Creating a report for a transaction
//! that already has one returns the stored row without refreshing it.
//!
//! # Summaries
//!
//! A summary is always recomputed by a full scan of the user's reports, never
//! incrementally, so a missed update is repaired by the next recompute. All
//! reports count regardless of their transaction status.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::clients::BalanceLedger;
use crate::error::AppError;
use crate::models::account::Account;
use crate::models::report::{NewReport, Report, ReportPage, ReportPageQuery, ReportSummary};
use crate::repository::{ReportStore, TransactionStore};

#[derive(Clone)]
pub struct ReportService {
    reports: Arc<dyn ReportStore>,
    transactions: Arc<dyn TransactionStore>,
    ledger: Arc<dyn BalanceLedger>,
    default_page_size: u32,
    max_page_size: u32,
}

impl ReportService {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        transactions: Arc<dyn TransactionStore>,
        ledger: Arc<dyn BalanceLedger>,
        default_page_size: u32,
        max_page_size: u32,
    ) -> Self {
        Self {
            reports,
            transactions,
            ledger,
            default_page_size,
            max_page_size,
        }
    }

    /// Create the report of one transaction.
    ///
    /// # Process
    ///
    /// 1. Return the existing report if there is one (`false`)
    /// 2. Fetch the transaction and the owner's account
    /// 3. Insert the snapshot (`true`)
    /// 4. Recompute the owner's summary; a failure here is logged only
    ///
    /// # Errors
    ///
    /// - `NotFound`: the transaction or the user does not exist
    /// - `Validation`: the transaction belongs to another user
    pub async fn create_report(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<(Report, bool), AppError> {
        if let Some(existing) = self.reports.find_by_transaction(transaction_id).await? {
            return Ok((existing, false));
        }

        let transaction = self
            .transactions
            .get(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;
        if transaction.user_id != user_id {
            return Err(AppError::Validation(format!(
                "Transaction {transaction_id} does not belong to user {user_id}"
            )));
        }
        let account = self.ledger.get_account(user_id).await?;

        let (report, created) = self
            .reports
            .insert(&NewReport::snapshot(&account, &transaction))
            .await?;
        tracing::info!(
            report_id = %report.id,
            transaction_id = %transaction_id,
            user_id = %user_id,
            created,
            "report stored"
        );

        if let Err(e) = self.recompute_summary(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "summary recompute failed");
        }

        Ok((report, created))
    }

    /// One page of a user's reports, newest transaction first.
    ///
    /// `page` defaults to 1 and `per_page` to the configured default;
    /// `per_page` is clamped to the configured maximum.
    pub async fn list_reports(
        &self,
        user_id: Uuid,
        query: ReportPageQuery,
    ) -> Result<ReportPage, AppError> {
        let page = query.page.unwrap_or(1);
        let per_page = query.per_page.unwrap_or(self.default_page_size);
        if page < 1 || per_page < 1 {
            return Err(AppError::Validation(
                "page and per_page must be at least 1".to_string(),
            ));
        }
        let per_page = per_page.min(self.max_page_size);

        let offset = i64::from(page - 1) * i64::from(per_page);
        let (data, total) = self
            .reports
            .page_for_user(user_id, i64::from(per_page), offset)
            .await?;

        Ok(ReportPage {
            data,
            total,
            page,
            per_page,
            total_pages: (total + i64::from(per_page) - 1) / i64::from(per_page),
        })
    }

    pub async fn get_summary(&self, user_id: Uuid) -> Result<ReportSummary, AppError> {
        self.reports
            .get_summary(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("summary for user {user_id}")))
    }

    /// Recompute with a freshly fetched balance.
    async fn recompute_summary(&self, user_id: Uuid) -> Result<ReportSummary, AppError> {
        let account = self.ledger.get_account(user_id).await?;
        refresh_summary(self.reports.as_ref(), &account).await
    }
}

/// Full-scan recompute of one user's summary.
///
/// The stored row is left untouched (including `updated_at`) when nothing
/// derived from the reports or the account changed.
pub async fn refresh_summary(
    store: &dyn ReportStore,
    account: &Account,
) -> Result<ReportSummary, AppError> {
    let reports = store.list_for_user(account.id).await?;
    let computed = ReportSummary::compute(account, &reports, Utc::now())?;

    if let Some(existing) = store.get_summary(account.id).await? {
        if existing.same_content(&computed) {
            return Ok(existing);
        }
    }

    store.put_summary(&computed).await?;
    Ok(computed)
}
