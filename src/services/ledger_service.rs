//! In-process Balance Ledger.
//!
//! Owns account balances. Mutations are serialized per account by the store
//! (row lock in PostgreSQL) and deduplicated by idempotency key, so a
//! redelivered settlement never debits twice.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::clients::BalanceLedger;
use crate::error::AppError;
use crate::models::account::{Account, BalanceAction, BalanceMutationRequest, CreateAccountRequest};
use crate::repository::AccountStore;

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn AccountStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Open an account with an optional starting balance.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank name or email, a negative balance, or a
    ///   duplicate email
    pub async fn create_account(&self, request: CreateAccountRequest) -> Result<Account, AppError> {
        request.validate()?;
        let account = self.store.create(&request).await?;
        tracing::info!(user_id = %account.id, "account opened");
        Ok(account)
    }

    /// Apply a credit or debit coming from the internal HTTP contract.
    pub async fn apply(
        &self,
        user_id: Uuid,
        request: BalanceMutationRequest,
    ) -> Result<Account, AppError> {
        request.validate()?;
        self.store
            .mutate(
                user_id,
                request.action,
                request.amount_cents,
                request.idempotency_key.as_deref(),
            )
            .await
    }
}

#[async_trait]
impl BalanceLedger for LedgerService {
    async fn get_account(&self, user_id: Uuid) -> Result<Account, AppError> {
        self.store
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        self.store.list().await
    }

    async fn mutate(
        &self,
        user_id: Uuid,
        action: BalanceAction,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> Result<Account, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::Validation("Amount must be positive".to_string()));
        }
        self.store
            .mutate(user_id, action, amount_cents, Some(idempotency_key))
            .await
    }
}
