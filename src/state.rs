//! Shared application state.
//!
//! Built once at startup from the configuration and the stores, then handed
//! to every handler through axum's `State` extractor. Each collaborator is
//! either the in-process service or an HTTP client, depending on whether its
//! URL is configured.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use crate::clients::http::{HttpBalanceLedger, HttpNotifier};
use crate::clients::{BalanceLedger, Notifier};
use crate::config::Config;
use crate::db::DbPool;
use crate::repository::postgres::PgStore;
use crate::repository::{AccountStore, NotificationStore, ReportStore, TransactionStore};
use crate::services::delivery::{DeliveryChannel, LogChannel, WebhookChannel};
use crate::services::ledger_service::LedgerService;
use crate::services::notification_service::NotificationService;
use crate::services::report_service::ReportService;
use crate::services::settlement::{SettlementQueue, SettlementWorker};
use crate::services::sync_service::SyncService;
use crate::services::transaction_service::TransactionService;

/// One handle per owned data set.
#[derive(Clone)]
pub struct Stores {
    pub transactions: Arc<dyn TransactionStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub reports: Arc<dyn ReportStore>,
}

impl Stores {
    /// Every store backed by the same PostgreSQL pool.
    pub fn postgres(pool: DbPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            transactions: store.clone(),
            accounts: store.clone(),
            notifications: store.clone(),
            reports: store,
        }
    }

    #[cfg(test)]
    pub fn memory(store: &crate::repository::memory::MemoryStore) -> Self {
        let store = Arc::new(store.clone());
        Self {
            transactions: store.clone(),
            accounts: store.clone(),
            notifications: store.clone(),
            reports: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub transactions: TransactionService,
    pub ledger: LedgerService,
    pub notifications: NotificationService,
    pub reports: ReportService,
    pub sync: SyncService,
    /// SHA-256 hex digest of the internal service token
    pub service_token_hash: Arc<str>,
}

impl AppState {
    /// Wire every service and start the settlement partitions.
    ///
    /// The returned handles finish once the state (and with it the queue) is
    /// dropped and every queued settlement has run.
    pub fn build(stores: Stores, config: &Config) -> anyhow::Result<(Self, Vec<JoinHandle<()>>)> {
        let ledger = LedgerService::new(stores.accounts.clone());

        let channel: Arc<dyn DeliveryChannel> = match &config.notification_webhook_url {
            Some(url) => {
                let secret = config
                    .notification_webhook_secret
                    .as_deref()
                    .context(
                        "NOTIFICATION_WEBHOOK_SECRET is required with NOTIFICATION_WEBHOOK_URL",
                    )?;
                Arc::new(WebhookChannel::new(url, secret, config.upstream_timeout())?)
            }
            None => Arc::new(LogChannel),
        };
        let notifications = NotificationService::new(
            stores.notifications.clone(),
            channel,
            config.notification_auto_send,
        );

        let balance_ledger: Arc<dyn BalanceLedger> = match &config.balance_ledger_url {
            Some(url) => {
                tracing::info!(url = %url, "using remote balance ledger");
                Arc::new(HttpBalanceLedger::new(
                    url,
                    &config.service_token,
                    config.upstream_timeout(),
                    config.mutation_timeout(),
                )?)
            }
            None => Arc::new(ledger.clone()),
        };
        let notifier: Arc<dyn Notifier> = match &config.notification_service_url {
            Some(url) => {
                tracing::info!(url = %url, "using remote notification service");
                Arc::new(HttpNotifier::new(
                    url,
                    &config.service_token,
                    config.upstream_timeout(),
                )?)
            }
            None => Arc::new(notifications.clone()),
        };

        let worker = Arc::new(SettlementWorker::new(
            stores.transactions.clone(),
            balance_ledger.clone(),
            notifier,
        ));
        let (queue, handles) = SettlementQueue::start(worker, config.settlement_partitions);
        tracing::info!(partitions = queue.partitions(), "settlement queue started");

        let state = Self {
            transactions: TransactionService::new(stores.transactions.clone(), queue),
            ledger,
            notifications,
            reports: ReportService::new(
                stores.reports.clone(),
                stores.transactions.clone(),
                balance_ledger.clone(),
                config.default_page_size,
                config.max_page_size,
            ),
            sync: SyncService::new(stores.reports, stores.transactions, balance_ledger),
            service_token_hash: hash_token(&config.service_token).into(),
        };
        Ok((state, handles))
    }
}

/// Hex SHA-256 of a service token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
