//! Balance Ledger HTTP handlers (internal).
//!
//! - POST /internal/accounts - Open an account
//! - GET /internal/accounts - User directory
//! - GET /internal/accounts/{user_id} - One account
//! - GET /internal/accounts/{user_id}/balance - Current balance only
//! - PUT /internal/accounts/{user_id}/balance - Credit or debit
//!
//! All routes require the `X-Service-Token` header.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    clients::BalanceLedger,
    error::AppError,
    models::account::{Account, BalanceMutationRequest, BalanceResponse, CreateAccountRequest},
    state::AppState,
};

/// Open an account.
///
/// # Request Body
///
/// ```json
/// {
///   "full_name": "Siti Rahma",
///   "email": "siti@example.com",
///   "initial_balance_cents": 10000
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the new account
/// - **400**: blank name or email, negative balance, duplicate email
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let account = state.ledger.create_account(request).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<Account>>, AppError> {
    Ok(Json(state.ledger.list_accounts().await?))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(state.ledger.get_account(user_id).await?))
}

/// # Response (200 OK)
///
/// ```json
/// {
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "balance_cents": 10000
/// }
/// ```
pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let account = state.ledger.get_account(user_id).await?;
    Ok(Json(BalanceResponse::from(&account)))
}

/// Credit or debit one account.
///
/// # Request Body
///
/// ```json
/// {
///   "action": "debit",
///   "amount_cents": 2500,
///   "idempotency_key": "770e8400-..."
/// }
/// ```
///
/// # Response
///
/// - **200 OK**: the account with its new balance
/// - **400**: non-positive or oversized amount
/// - **404**: unknown user
/// - **422** `insufficient_funds`: the debit exceeds the balance, nothing changed
pub async fn update_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<BalanceMutationRequest>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(state.ledger.apply(user_id, request).await?))
}
