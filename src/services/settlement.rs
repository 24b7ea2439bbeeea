//! Asynchronous settlement of accepted transactions.
//!
//! # Flow
//!
//! ```text
//! intake -> SettlementQueue::enqueue -> partition task -> SettlementWorker::settle
//!                                                           |- BalanceLedger::get_account
//!                                                           |- BalanceLedger::mutate
//!                                                           |- Notifier::notify
//!                                                           '- TransactionStore::mark_terminal
//! ```
//!
//! # Ordering
//!
//! The queue has one unbounded channel per partition, each drained by a
//! single task. A transaction is routed by `user_id`, so settlements of one
//! user never run concurrently in this process.
//!
//! # Redelivery
//!
//! Pending transactions are re-enqueued at startup. The balance mutation uses
//! the transaction id as idempotency key and the terminal write only applies
//! to `pending` rows, so settling the same transaction twice has one effect.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clients::{BalanceLedger, Notifier};
use crate::error::AppError;
use crate::models::account::BalanceAction;
use crate::models::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::repository::TransactionStore;

/// Settles one transaction at a time.
pub struct SettlementWorker {
    transactions: Arc<dyn TransactionStore>,
    ledger: Arc<dyn BalanceLedger>,
    notifier: Arc<dyn Notifier>,
}

impl SettlementWorker {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        ledger: Arc<dyn BalanceLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            transactions,
            ledger,
            notifier,
        }
    }

    /// Move a pending transaction to its terminal status.
    ///
    /// # Process
    ///
    /// 1. Return terminal transactions unchanged
    /// 2. Resolve the owner's account; a missing or unreachable ledger fails
    ///    the transaction without attempting a mutation
    /// 3. Credit or debit with the transaction id as idempotency key
    /// 4. Notify the user of the outcome (failure only logged)
    /// 5. Write the terminal status once
    ///
    /// # Errors
    ///
    /// Only a failed terminal write is returned. The transaction then stays
    /// `pending` until the next startup redelivers it.
    pub async fn settle(&self, transaction: Transaction) -> Result<Transaction, AppError> {
        if transaction.status.is_terminal() {
            tracing::debug!(transaction_id = %transaction.id, "already settled, skipping");
            return Ok(transaction);
        }

        let outcome = self.apply(&transaction).await;
        let (status, failure_reason) = match &outcome {
            Ok(_) => (TransactionStatus::Success, None),
            Err(e) => (TransactionStatus::Failed, Some(e.to_string())),
        };

        let message = outcome_message(
            &transaction,
            outcome.as_ref().ok().copied(),
            failure_reason.as_deref(),
        );
        if let Err(e) = self.notifier.notify(transaction.user_id, &message).await {
            tracing::warn!(
                transaction_id = %transaction.id,
                user_id = %transaction.user_id,
                error = %e,
                "notification failed"
            );
        }

        let settled = match self
            .transactions
            .mark_terminal(transaction.id, status, failure_reason)
            .await
        {
            Ok(settled) => settled,
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction.id,
                    status = %status,
                    error = %e,
                    "failed to record settlement outcome"
                );
                return Err(e);
            }
        };

        match settled {
            Some(settled) => {
                tracing::info!(
                    transaction_id = %settled.id,
                    user_id = %settled.user_id,
                    status = %settled.status,
                    "transaction settled"
                );
                Ok(settled)
            }
            None => {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    "transaction was no longer pending, keeping stored status"
                );
                self.transactions
                    .get(transaction.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("transaction {}", transaction.id)))
            }
        }
    }

    /// Steps 2 and 3. Returns the balance after the mutation.
    async fn apply(&self, transaction: &Transaction) -> Result<i64, AppError> {
        self.ledger.get_account(transaction.user_id).await?;
        let account = self
            .ledger
            .mutate(
                transaction.user_id,
                BalanceAction::from(transaction.transaction_type),
                transaction.amount_cents,
                &transaction.id.to_string(),
            )
            .await?;
        Ok(account.balance_cents)
    }
}

/// Message sent to the user once the outcome is known.
fn outcome_message(
    transaction: &Transaction,
    balance_after: Option<i64>,
    failure_reason: Option<&str>,
) -> String {
    let kind = match transaction.transaction_type {
        TransactionType::Credit => "Credit",
        TransactionType::Debit => "Debit",
    };
    let amount = format_cents(transaction.amount_cents);

    match (balance_after, failure_reason) {
        (Some(balance), _) => format!(
            "{kind} of {amount} succeeded. New balance: {}.",
            format_cents(balance)
        ),
        (None, Some(reason)) => format!("{kind} of {amount} failed: {reason}."),
        (None, None) => format!("{kind} of {amount} failed."),
    }
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

/// Partitioned in-process queue feeding the settlement worker.
#[derive(Clone)]
pub struct SettlementQueue {
    senders: Arc<Vec<mpsc::UnboundedSender<Transaction>>>,
}

impl SettlementQueue {
    /// Spawn one draining task per partition.
    ///
    /// The tasks end once every clone of the returned queue is dropped and
    /// their channels are empty; await the handles to drain on shutdown.
    pub fn start(worker: Arc<SettlementWorker>, partitions: usize) -> (Self, Vec<JoinHandle<()>>) {
        let partitions = partitions.max(1);
        let mut senders = Vec::with_capacity(partitions);
        let mut handles = Vec::with_capacity(partitions);

        for partition in 0..partitions {
            let (sender, receiver) = mpsc::unbounded_channel();
            senders.push(sender);
            handles.push(tokio::spawn(drain(partition, worker.clone(), receiver)));
        }

        let queue = Self {
            senders: Arc::new(senders),
        };
        (queue, handles)
    }

    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Partition owning every transaction of `user_id`.
    pub fn partition_for(&self, user_id: Uuid) -> usize {
        (user_id.as_u128() % self.senders.len() as u128) as usize
    }

    /// Hand a transaction to its partition.
    ///
    /// # Errors
    ///
    /// `UpstreamUnavailable` when the partition task has stopped. The
    /// transaction stays `pending` and is picked up at the next startup.
    pub fn enqueue(&self, transaction: Transaction) -> Result<(), AppError> {
        let partition = self.partition_for(transaction.user_id);
        self.senders[partition].send(transaction).map_err(|e| {
            AppError::UpstreamUnavailable(format!(
                "settlement partition {partition} stopped; transaction {} left pending",
                e.0.id
            ))
        })
    }
}

async fn drain(
    partition: usize,
    worker: Arc<SettlementWorker>,
    mut receiver: mpsc::UnboundedReceiver<Transaction>,
) {
    while let Some(transaction) = receiver.recv().await {
        // settle logs its own failures
        let _ = worker.settle(transaction).await;
    }
    tracing::info!(partition, "settlement partition drained");
}
