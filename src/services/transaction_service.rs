//! Transaction Ledger: intake and status queries.
//!
//! This service handles:
//! - Validating and recording new transactions as `pending`
//! - Handing them to the settlement queue
//! - Re-enqueueing transactions left pending by a previous run
//!
//! # Intake Guarantees
//!
//! The pending row is committed before the transaction is enqueued, so a
//! crash between the two leaves a row that the next startup picks up. The
//! caller never waits for settlement; it polls `GET /transactions/{id}`.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::transaction::{CreateTransactionRequest, Transaction};
use crate::repository::TransactionStore;
use crate::services::settlement::SettlementQueue;

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn TransactionStore>,
    queue: SettlementQueue,
}

impl TransactionService {
    pub fn new(store: Arc<dyn TransactionStore>, queue: SettlementQueue) -> Self {
        Self { store, queue }
    }

    /// Record a transaction and schedule its settlement.
    ///
    /// # Process
    ///
    /// 1. Validate the request (positive amount, user id present)
    /// 2. Insert the transaction as `pending`
    /// 3. Enqueue it on the owner's settlement partition
    ///
    /// # Returns
    ///
    /// The pending transaction, before any balance has moved.
    ///
    /// # Errors
    ///
    /// - `Validation`: malformed request, nothing stored
    /// - `Persistence`: the pending row could not be written
    pub async fn create(&self, request: CreateTransactionRequest) -> Result<Transaction, AppError> {
        request.validate()?;

        let transaction = self
            .store
            .insert_pending(request.user_id, request.transaction_type, request.amount_cents)
            .await?;

        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %transaction.user_id,
            kind = %transaction.transaction_type,
            amount_cents = transaction.amount_cents,
            "transaction accepted"
        );

        // The row is durable; a failed hand-off is recovered at startup
        if let Err(e) = self.queue.enqueue(transaction.clone()) {
            tracing::error!(transaction_id = %transaction.id, error = %e, "enqueue failed");
        }

        Ok(transaction)
    }

    pub async fn get(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {id}")))
    }

    /// Every transaction, newest first.
    pub async fn list(&self) -> Result<Vec<Transaction>, AppError> {
        self.store.list().await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        self.store.list_for_user(user_id).await
    }

    /// Re-enqueue every transaction still `pending`, oldest first.
    ///
    /// Called once at startup, before the server accepts requests.
    pub async fn recover_pending(&self) -> Result<usize, AppError> {
        let pending = self.store.list_pending().await?;
        let count = pending.len();
        for transaction in pending {
            self.queue.enqueue(transaction)?;
        }
        if count > 0 {
            tracing::info!(count, "re-enqueued pending transactions");
        }
        Ok(count)
    }

    /// Database round trip for the health endpoint.
    pub async fn ping(&self) -> Result<(), AppError> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::{TransactionStatus, TransactionType};
    use crate::repository::memory::MemoryStore;
    use crate::services::ledger_service::LedgerService;
    use crate::services::settlement::SettlementWorker;
    use crate::services::delivery::LogChannel;
    use crate::services::notification_service::NotificationService;
    use tokio::task::JoinHandle;

    fn service(store: &MemoryStore) -> (TransactionService, Vec<JoinHandle<()>>) {
        let shared = Arc::new(store.clone());
        let ledger = Arc::new(LedgerService::new(shared.clone()));
        let notifier = Arc::new(NotificationService::new(
            shared.clone(),
            Arc::new(LogChannel),
            false,
        ));
        let worker = Arc::new(SettlementWorker::new(shared.clone(), ledger, notifier));
        let (queue, handles) = SettlementQueue::start(worker, 2);
        (TransactionService::new(shared, queue), handles)
    }

    async fn drain(service: TransactionService, handles: Vec<JoinHandle<()>>) {
        drop(service);
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn intake_returns_pending_then_settles() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.seed_account(user, "Ana Lima", 100);
        let (service, handles) = service(&store);

        let accepted = service
            .create(CreateTransactionRequest {
                user_id: user,
                transaction_type: TransactionType::Credit,
                amount_cents: 50,
            })
            .await
            .unwrap();
        assert_eq!(accepted.status, TransactionStatus::Pending);
        assert_eq!(accepted.settled_at, None);

        drain(service, handles).await;

        let settled = TransactionStore::get(&store, accepted.id).await.unwrap().unwrap();
        assert_eq!(settled.status, TransactionStatus::Success);
        assert_eq!(store.balance_of(user), Some(150));
    }

    #[tokio::test]
    async fn invalid_amount_stores_nothing() {
        let store = MemoryStore::new();
        let (service, _handles) = service(&store);

        let err = service
            .create(CreateTransactionRequest {
                user_id: Uuid::new_v4(),
                transaction_type: TransactionType::Debit,
                amount_cents: 0,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn leftover_pending_rows_are_recovered() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.seed_account(user, "Ana Lima", 100);
        // Accepted by a previous run that never settled it
        let left = store
            .insert_pending(user, TransactionType::Debit, 30)
            .await
            .unwrap();

        let (service, handles) = service(&store);
        assert_eq!(service.recover_pending().await.unwrap(), 1);
        drain(service, handles).await;

        let stored = TransactionStore::get(&store, left.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
        assert_eq!(store.balance_of(user), Some(70));
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let store = MemoryStore::new();
        let (service, _handles) = service(&store);
        let err = service.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
