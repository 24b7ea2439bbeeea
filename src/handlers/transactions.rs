//! Transaction HTTP handlers.
//!
//! - POST /transactions - Accept a transaction for settlement
//! - GET /transactions - List every transaction
//! - GET /transactions/{id} - Poll one transaction
//! - GET /transactions/user/{user_id} - List a user's transactions

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::transaction::{CreateTransactionRequest, Transaction},
    state::AppState,
};

/// Accept a credit or debit.
///
/// # Request Body
///
/// ```json
/// {
///   "user_id": "550e8400-...",
///   "type": "credit",
///   "amount_cents": 5000
/// }
/// ```
///
/// # Response (202 Accepted)
///
/// The transaction as stored, always `"status": "pending"`. Settlement runs
/// in the background; poll `GET /transactions/{id}` for the outcome and
/// `failure_reason`.
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let transaction = state.transactions.create(request).await?;
    Ok((StatusCode::ACCEPTED, Json(transaction)))
}

/// Newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.transactions.list().await?))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(state.transactions.get(transaction_id).await?))
}

pub async fn list_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.transactions.list_for_user(user_id).await?))
}
