//! Balance Ledger data models and API request types.
//!
//! This module defines:
//! - `Account`: a user's balance as owned by the Balance Ledger
//! - `CreateAccountRequest`: request body for opening an account
//! - `BalanceMutationRequest`: request body for the credit/debit contract
//! - `BalanceResponse`: balance-only read

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::transaction::{MAX_AMOUNT_CENTS, TransactionType};

/// A user's account as seen through the Balance Ledger.
///
/// Every read of this struct outside the ledger is a point-in-time snapshot.
///
/// # Balance Storage
///
/// Balances are stored as `i64` cents to avoid floating-point precision issues.
/// The ledger never lets `balance_cents` go below zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier, which is also the user id
    pub id: Uuid,

    pub full_name: String,

    pub email: String,

    /// Current balance in cents, always >= 0
    pub balance_cents: i64,

    pub created_at: DateTime<Utc>,

    /// Timestamp of last balance update
    pub updated_at: DateTime<Utc>,
}

/// Request body for opening a new account.
///
/// # JSON Example
///
/// ```json
/// {
///   "full_name": "Siti Rahma",
///   "email": "siti@example.com",
///   "initial_balance_cents": 10000
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRequest {
    pub full_name: String,

    pub email: String,

    #[serde(default)]
    pub initial_balance_cents: i64,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.full_name.trim().is_empty() || self.email.trim().is_empty() {
            return Err(AppError::Validation(
                "full_name and email are required".to_string(),
            ));
        }
        if self.initial_balance_cents < 0 {
            return Err(AppError::Validation(
                "Balance cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Response of `GET /internal/accounts/{user_id}/balance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub balance_cents: i64,
}

impl From<&Account> for BalanceResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.id,
            balance_cents: account.balance_cents,
        }
    }
}

/// Balance mutation direction accepted by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceAction {
    Credit,
    Debit,
}

impl BalanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceAction::Credit => "credit",
            BalanceAction::Debit => "debit",
        }
    }
}

impl From<TransactionType> for BalanceAction {
    fn from(transaction_type: TransactionType) -> Self {
        match transaction_type {
            TransactionType::Credit => BalanceAction::Credit,
            TransactionType::Debit => BalanceAction::Debit,
        }
    }
}

/// Request body for `PUT /internal/accounts/{user_id}/balance`.
///
/// # JSON Example
///
/// ```json
/// {
///   "action": "debit",
///   "amount_cents": 2500,
///   "idempotency_key": "770e8400-e29b-41d4-a716-446655440002"
/// }
/// ```
///
/// A repeated request with the same `idempotency_key` returns the outcome
/// recorded the first time instead of mutating again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceMutationRequest {
    pub action: BalanceAction,

    pub amount_cents: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl BalanceMutationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.amount_cents <= 0 {
            return Err(AppError::Validation(
                "Amount must be positive".to_string(),
            ));
        }
        if self.amount_cents > MAX_AMOUNT_CENTS {
            return Err(AppError::Validation(format!(
                "Amount cannot exceed {MAX_AMOUNT_CENTS} cents"
            )));
        }
        Ok(())
    }
}
