//! Sync Reconciler.
//!
//! Rebuilds reports and summaries from the authoritative ledgers.
//!
//! # Process
//!
//! 1. Take the in-process guard; a second concurrent run gets `SyncInProgress`
//! 2. Fetch every transaction and every account before writing anything
//! 3. Upsert one report per transaction whose owner exists
//! 4. Sweep reports that were not upserted in this run
//! 5. Recompute every user's summary and sweep summaries of unknown users
//!
//! A failure after step 2 leaves a superset of the correct rows, never an
//! empty table.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::clients::BalanceLedger;
use crate::error::AppError;
use crate::models::account::Account;
use crate::models::report::{NewReport, SyncResult};
use crate::repository::{ReportStore, TransactionStore};
use crate::services::report_service::refresh_summary;

#[derive(Clone)]
pub struct SyncService {
    reports: Arc<dyn ReportStore>,
    transactions: Arc<dyn TransactionStore>,
    ledger: Arc<dyn BalanceLedger>,
    guard: Arc<Mutex<()>>,
}

impl SyncService {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        transactions: Arc<dyn TransactionStore>,
        ledger: Arc<dyn BalanceLedger>,
    ) -> Self {
        Self {
            reports,
            transactions,
            ledger,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub async fn sync_all(&self) -> Result<SyncResult, AppError> {
        let _running = self.guard.try_lock().map_err(|_| AppError::SyncInProgress)?;
        tracing::info!("reconciliation started");

        let transactions = self.transactions.list().await?;
        let accounts = self.ledger.list_accounts().await?;
        let directory: HashMap<Uuid, &Account> = accounts.iter().map(|a| (a.id, a)).collect();

        let mut kept = Vec::with_capacity(transactions.len());
        for transaction in &transactions {
            match directory.get(&transaction.user_id) {
                Some(account) => {
                    self.reports
                        .upsert(&NewReport::snapshot(account, transaction))
                        .await?;
                    kept.push(transaction.id);
                }
                None => tracing::debug!(
                    transaction_id = %transaction.id,
                    user_id = %transaction.user_id,
                    "owner not in directory, skipping"
                ),
            }
        }
        let swept_reports = self.reports.delete_reports_except(&kept).await?;

        for account in &accounts {
            match refresh_summary(self.reports.as_ref(), account).await {
                Ok(_) => {}
                Err(AppError::Validation(reason)) => tracing::warn!(
                    user_id = %account.id,
                    reason = %reason,
                    "summary left as is"
                ),
                Err(e) => return Err(e),
            }
        }
        let users: Vec<Uuid> = accounts.iter().map(|a| a.id).collect();
        let swept_summaries = self.reports.delete_summaries_except(&users).await?;

        let result = SyncResult {
            synced_reports: kept.len(),
            synced_users: accounts.len(),
        };
        tracing::info!(
            synced_reports = result.synced_reports,
            synced_users = result.synced_users,
            swept_reports,
            swept_summaries,
            "reconciliation finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::report::ReportSummary;
    use crate::models::transaction::{TransactionStatus, TransactionType};
    use crate::repository::memory::MemoryStore;
    use crate::services::ledger_service::LedgerService;
    use chrono::Utc;

    fn service(store: &MemoryStore) -> SyncService {
        let shared = Arc::new(store.clone());
        SyncService::new(shared.clone(), shared.clone(), Arc::new(LedgerService::new(shared)))
    }

    async fn seed(store: &MemoryStore) -> (Uuid, Uuid) {
        let ana = Uuid::new_v4();
        let budi = Uuid::new_v4();
        store.seed_account(ana, "Ana Lima", 150);
        store.seed_account(budi, "Budi Santoso", 0);
        for (user, kind, amount) in [
            (ana, TransactionType::Credit, 50),
            (ana, TransactionType::Debit, 20),
            (budi, TransactionType::Credit, 70),
        ] {
            let tx = store.insert_pending(user, kind, amount).await.unwrap();
            store
                .mark_terminal(tx.id, TransactionStatus::Success, None)
                .await
                .unwrap();
        }
        (ana, budi)
    }

    #[tokio::test]
    async fn rebuilds_reports_and_summaries() {
        let store = MemoryStore::new();
        let (ana, budi) = seed(&store).await;

        let result = service(&store).sync_all().await.unwrap();

        assert_eq!(result.synced_reports, 3);
        assert_eq!(result.synced_users, 2);
        let summary = store.get_summary(ana).await.unwrap().unwrap();
        assert_eq!(summary.total_transactions, 2);
        assert_eq!(summary.total_credit_cents, 50);
        assert_eq!(summary.total_debit_cents, 20);
        assert_eq!(summary.current_balance_cents, 150);
        assert_eq!(store.get_summary(budi).await.unwrap().unwrap().total_transactions, 1);
    }

    #[tokio::test]
    async fn two_runs_give_identical_summaries() {
        let store = MemoryStore::new();
        let (ana, budi) = seed(&store).await;
        let sync = service(&store);

        sync.sync_all().await.unwrap();
        let first = (
            store.get_summary(ana).await.unwrap(),
            store.get_summary(budi).await.unwrap(),
        );
        sync.sync_all().await.unwrap();
        let second = (
            store.get_summary(ana).await.unwrap(),
            store.get_summary(budi).await.unwrap(),
        );

        assert_eq!(first, second);
        assert_eq!(store.report_count(), 3);
    }

    #[tokio::test]
    async fn stale_rows_are_swept() {
        let store = MemoryStore::new();
        let (ana, _) = seed(&store).await;
        let citra = Uuid::new_v4();
        let account = store.seed_account(citra, "Citra Dewi", 0);
        let tx = store
            .insert_pending(citra, TransactionType::Credit, 10)
            .await
            .unwrap();
        ReportStore::insert(&store, &NewReport::snapshot(&account, &tx))
            .await
            .unwrap();
        store
            .put_summary(&ReportSummary::compute(&account, &[], Utc::now()).unwrap())
            .await
            .unwrap();

        // Report of an unknown transaction, summary of an unknown user
        let mut orphan = NewReport::snapshot(&account, &tx);
        orphan.transaction_id = Uuid::new_v4();
        ReportStore::insert(&store, &orphan).await.unwrap();
        let mut stranger = account.clone();
        stranger.id = Uuid::new_v4();
        store
            .put_summary(&ReportSummary::compute(&stranger, &[], Utc::now()).unwrap())
            .await
            .unwrap();
        assert_eq!(store.summary_count(), 2);

        let result = service(&store).sync_all().await.unwrap();

        // Citra's transaction still exists, so only the orphan report goes
        assert_eq!(result.synced_reports, 4);
        assert_eq!(store.report_count(), 4);
        assert_eq!(store.summary_count(), 3);
        assert!(store.get_summary(ana).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transactions_of_unknown_users_are_skipped() {
        let store = MemoryStore::new();
        seed(&store).await;
        store
            .insert_pending(Uuid::new_v4(), TransactionType::Credit, 10)
            .await
            .unwrap();

        let result = service(&store).sync_all().await.unwrap();

        assert_eq!(result.synced_reports, 3);
        assert_eq!(store.report_count(), 3);
    }

    #[tokio::test]
    async fn overflowing_user_does_not_block_others() {
        let store = MemoryStore::new();
        let (ana, budi) = seed(&store).await;
        let dewi = Uuid::new_v4();
        store.seed_account(dewi, "Dewi Lestari", 0);
        for _ in 0..2 {
            let tx = store
                .insert_pending(dewi, TransactionType::Credit, i64::MAX)
                .await
                .unwrap();
            store
                .mark_terminal(tx.id, TransactionStatus::Failed, Some("Balance overflow".into()))
                .await
                .unwrap();
        }

        let result = service(&store).sync_all().await.unwrap();

        assert_eq!(result.synced_reports, 5);
        assert_eq!(result.synced_users, 3);
        assert!(store.get_summary(dewi).await.unwrap().is_none());
        assert!(store.get_summary(ana).await.unwrap().is_some());
        assert!(store.get_summary(budi).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_derived_data_untouched() {
        let store = MemoryStore::new();
        seed(&store).await;
        let sync = service(&store);
        sync.sync_all().await.unwrap();

        store.fail_on("list_accounts");
        assert!(sync.sync_all().await.is_err());
        assert_eq!(store.report_count(), 3);
        assert_eq!(store.summary_count(), 2);

        store.heal();
        assert!(sync.sync_all().await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected() {
        let store = MemoryStore::new();
        let sync = service(&store);
        let _held = sync.guard.try_lock().unwrap();

        let err = sync.sync_all().await.unwrap_err();
        assert!(matches!(err, AppError::SyncInProgress));
    }
}
