//! Transaction data models and API request/response types.
//!
//! This module defines:
//! - `Transaction`: a recorded transaction intent and its outcome
//! - `TransactionType` / `TransactionStatus`
//! - `CreateTransactionRequest`: request body for intake

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Direction of a transaction, from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money added to the user's balance (top-up)
    Credit,
    /// Money removed from the user's balance
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(TransactionType::Credit),
            "debit" => Ok(TransactionType::Debit),
            other => Err(AppError::Validation(format!(
                "Unknown transaction type: {other}"
            ))),
        }
    }
}

/// Settlement status of a transaction.
///
/// `Pending` is the only non-terminal state. Once `Success` or `Failed`
/// is stored it is never changed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(AppError::Validation(format!(
                "Unknown transaction status: {other}"
            ))),
        }
    }
}

/// A transaction recorded by the Transaction Ledger.
///
/// # Lifecycle
///
/// Created `pending` by intake, then moved exactly once to `success` or
/// `failed` by the settlement worker. `failure_reason` is only set for
/// `failed` and is what a polling client reads to learn why.
///
/// Amounts are stored in cents (never floats).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: Uuid,

    /// Owner of the balance this transaction mutates
    pub user_id: Uuid,

    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    /// Always positive
    pub amount_cents: i64,

    pub status: TransactionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,

    /// When the terminal status was written
    pub settled_at: Option<DateTime<Utc>>,
}

/// Largest amount a single transaction or balance mutation may carry
/// (10 billion in major units). Keeps per-user totals far from `i64::MAX`.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;

/// Request to record a new transaction.
///
/// # JSON Example
///
/// ```json
/// {
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "type": "debit",
///   "amount_cents": 5000
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub user_id: Uuid,

    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    pub amount_cents: i64,
}

impl CreateTransactionRequest {
    /// Reject the request before anything is stored.
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
        if self.user_id.is_nil() {
            return Err(AppError::Validation("user_id is required".to_string()));
        }
        Ok(())
    }
}
