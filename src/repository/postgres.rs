//! PostgreSQL implementation of every store trait.
//!
//! Queries are written by hand with `sqlx::query_as` and decoded into private
//! row structs; text columns holding enums are parsed on the way out.
//!
//! # Atomicity Guarantees
//!
//! Balance mutations happen inside a PostgreSQL transaction holding a
//! `FOR UPDATE` lock on the account row, so mutations of one account are
//! serialized and a failure rolls everything back.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::account::{Account, BalanceAction, CreateAccountRequest};
use crate::models::notification::{Notification, NotificationStatus};
use crate::models::report::{NewReport, Report, ReportSummary};
use crate::models::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::repository::{AccountStore, NotificationStore, ReportStore, TransactionStore};

/// All stores backed by one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Parse an enum stored as text, reporting corrupt values as decode failures.
fn decode<T>(value: &str) -> Result<T, AppError>
where
    T: FromStr<Err = AppError>,
{
    value
        .parse()
        .map_err(|e: AppError| AppError::Persistence(sqlx::Error::Decode(Box::new(e))))
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    transaction_type: String,
    amount_cents: i64,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            transaction_type: decode(&row.transaction_type)?,
            amount_cents: row.amount_cents,
            status: decode(&row.status)?,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            settled_at: row.settled_at,
        })
    }
}

fn transactions(rows: Vec<TransactionRow>) -> Result<Vec<Transaction>, AppError> {
    rows.into_iter().map(Transaction::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    full_name: String,
    email: String,
    balance_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            balance_cents: row.balance_cents,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    message: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            message: row.message,
            status: decode(&row.status)?,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    user_id: Uuid,
    transaction_id: Uuid,
    full_name: String,
    email: String,
    transaction_type: String,
    amount_cents: i64,
    transaction_status: String,
    balance_after_cents: i64,
    transaction_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = AppError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            transaction_id: row.transaction_id,
            full_name: row.full_name,
            email: row.email,
            transaction_type: decode::<TransactionType>(&row.transaction_type)?,
            amount_cents: row.amount_cents,
            transaction_status: decode::<TransactionStatus>(&row.transaction_status)?,
            balance_after_cents: row.balance_after_cents,
            transaction_date: row.transaction_date,
            created_at: row.created_at,
        })
    }
}

fn reports(rows: Vec<ReportRow>) -> Result<Vec<Report>, AppError> {
    rows.into_iter().map(Report::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    user_id: Uuid,
    full_name: String,
    email: String,
    total_transactions: i64,
    total_credit_cents: i64,
    total_debit_cents: i64,
    current_balance_cents: i64,
    last_transaction_date: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<SummaryRow> for ReportSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            user_id: row.user_id,
            full_name: row.full_name,
            email: row.email,
            total_transactions: row.total_transactions,
            total_credit_cents: row.total_credit_cents,
            total_debit_cents: row.total_debit_cents,
            current_balance_cents: row.current_balance_cents,
            last_transaction_date: row.last_transaction_date,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_pending(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        amount_cents: i64,
    ) -> Result<Transaction, AppError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (user_id, transaction_type, amount_cents, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(transaction_type.as_str())
        .bind(amount_cents)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Transaction>, AppError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        transactions(rows)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        transactions(rows)
    }

    async fn list_pending(&self) -> Result<Vec<Transaction>, AppError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        transactions(rows)
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        status: TransactionStatus,
        failure_reason: Option<String>,
    ) -> Result<Option<Transaction>, AppError> {
        // The status guard makes the terminal write happen at most once
        sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $2,
                failure_reason = $3,
                settled_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(failure_reason)
        .fetch_optional(&self.pool)
        .await?
        .map(Transaction::try_from)
        .transpose()
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create(&self, request: &CreateAccountRequest) -> Result<Account, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (full_name, email, balance_cents)
            VALUES ($1, $2, $3)
            RETURNING id, full_name, email, balance_cents, created_at, updated_at
            "#,
        )
        .bind(request.full_name.trim())
        .bind(request.email.trim().to_lowercase())
        .bind(request.initial_balance_cents)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Validation("Email already exists".to_string())
            }
            other => AppError::Persistence(other),
        })?;

        Ok(row.into())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, full_name, email, balance_cents, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<Account>, AppError> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, full_name, email, balance_cents, created_at, updated_at
            FROM accounts
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mutate(
        &self,
        id: Uuid,
        action: BalanceAction,
        amount_cents: i64,
        idempotency_key: Option<&str>,
    ) -> Result<Account, AppError> {
        let mut tx = self.pool.begin().await?;

        // Lock the account; concurrent mutations of the same account wait here
        let account: Account = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, full_name, email, balance_cents, created_at, updated_at
            FROM accounts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("account {id}")))?
        .into();

        // Replay of an already recorded mutation
        if let Some(key) = idempotency_key {
            let recorded: Option<String> = sqlx::query_scalar(
                "SELECT outcome FROM balance_mutations WHERE idempotency_key = $1",
            )
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(outcome) = recorded {
                tx.rollback().await?;
                tracing::info!(
                    account_id = %id,
                    idempotency_key = key,
                    "Replayed balance mutation"
                );
                return match outcome.as_str() {
                    "insufficient_funds" => Err(AppError::InsufficientFunds),
                    _ => Ok(account),
                };
            }
        }

        let new_balance = match action {
            BalanceAction::Credit => account.balance_cents.checked_add(amount_cents),
            BalanceAction::Debit => account.balance_cents.checked_sub(amount_cents),
        }
        .ok_or_else(|| AppError::Validation("Balance overflow".to_string()))?;

        if new_balance < 0 {
            // Record the rejection too, so a replay answers the same way
            if let Some(key) = idempotency_key {
                record_mutation(
                    &mut tx,
                    key,
                    &account,
                    action,
                    amount_cents,
                    "insufficient_funds",
                    account.balance_cents,
                )
                .await?;
                tx.commit().await?;
            } else {
                tx.rollback().await?;
            }
            return Err(AppError::InsufficientFunds);
        }

        let updated: Account = sqlx::query_as::<_, AccountRow>(
            r#"
            UPDATE accounts
            SET balance_cents = $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING id, full_name, email, balance_cents, created_at, updated_at
            "#,
        )
        .bind(new_balance)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?
        .into();

        if let Some(key) = idempotency_key {
            record_mutation(
                &mut tx,
                key,
                &account,
                action,
                amount_cents,
                "applied",
                new_balance,
            )
            .await?;
        }

        // Commit all changes atomically
        tx.commit().await?;

        Ok(updated)
    }
}

async fn record_mutation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key: &str,
    account: &Account,
    action: BalanceAction,
    amount_cents: i64,
    outcome: &str,
    balance_after_cents: i64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO balance_mutations (
            idempotency_key,
            account_id,
            action,
            amount_cents,
            outcome,
            balance_after_cents
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(key)
    .bind(account.id)
    .bind(action.as_str())
    .bind(amount_cents)
    .bind(outcome)
    .bind(balance_after_cents)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, user_id: Uuid, message: &str) -> Result<Notification, AppError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (user_id, message, status)
            VALUES ($1, $2, 'pending')
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, AppError> {
        sqlx::query_as::<_, NotificationRow>("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Notification::try_from)
            .transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, AppError> {
        sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Notification::try_from)
        .collect()
    }

    async fn list(&self) -> Result<Vec<Notification>, AppError> {
        sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Notification::try_from)
        .collect()
    }

    async fn claim(
        &self,
        id: Uuid,
        from: NotificationStatus,
    ) -> Result<Option<Notification>, AppError> {
        sqlx::query_as::<_, NotificationRow>(
            r#"
            UPDATE notifications
            SET status = 'sending',
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Notification::try_from)
        .transpose()
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        status: NotificationStatus,
        last_error: Option<String>,
    ) -> Result<Notification, AppError> {
        sqlx::query_as::<_, NotificationRow>(
            r#"
            UPDATE notifications
            SET status = $2,
                last_error = $3,
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(last_error)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("delivery attempt of notification {id}")))?
        .try_into()
    }

    async fn release_interrupted(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'failed',
                last_error = 'delivery interrupted',
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE status = 'sending'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn find_by_transaction(&self, transaction_id: Uuid) -> Result<Option<Report>, AppError> {
        sqlx::query_as::<_, ReportRow>("SELECT * FROM reports WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Report::try_from)
            .transpose()
    }

    async fn insert(&self, report: &NewReport) -> Result<(Report, bool), AppError> {
        let inserted = sqlx::query_as::<_, ReportRow>(
            r#"
            INSERT INTO reports (
                user_id,
                transaction_id,
                full_name,
                email,
                transaction_type,
                amount_cents,
                transaction_status,
                balance_after_cents,
                transaction_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(report.user_id)
        .bind(report.transaction_id)
        .bind(&report.full_name)
        .bind(&report.email)
        .bind(report.transaction_type.as_str())
        .bind(report.amount_cents)
        .bind(report.transaction_status.as_str())
        .bind(report.balance_after_cents)
        .bind(report.transaction_date)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok((Report::try_from(row)?, true)),
            // Lost a race against another insert for the same transaction
            None => self
                .find_by_transaction(report.transaction_id)
                .await?
                .map(|existing| (existing, false))
                .ok_or(AppError::Persistence(sqlx::Error::RowNotFound)),
        }
    }

    async fn upsert(&self, report: &NewReport) -> Result<Report, AppError> {
        let row = sqlx::query_as::<_, ReportRow>(
            r#"
            INSERT INTO reports (
                user_id,
                transaction_id,
                full_name,
                email,
                transaction_type,
                amount_cents,
                transaction_status,
                balance_after_cents,
                transaction_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (transaction_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                transaction_type = EXCLUDED.transaction_type,
                amount_cents = EXCLUDED.amount_cents,
                transaction_status = EXCLUDED.transaction_status,
                balance_after_cents = EXCLUDED.balance_after_cents,
                transaction_date = EXCLUDED.transaction_date
            RETURNING *
            "#,
        )
        .bind(report.user_id)
        .bind(report.transaction_id)
        .bind(&report.full_name)
        .bind(&report.email)
        .bind(report.transaction_type.as_str())
        .bind(report.amount_cents)
        .bind(report.transaction_status.as_str())
        .bind(report.balance_after_cents)
        .bind(report.transaction_date)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Report>, AppError> {
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT * FROM reports WHERE user_id = $1 ORDER BY transaction_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        reports(rows)
    }

    async fn page_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Report>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT * FROM reports
            WHERE user_id = $1
            ORDER BY transaction_date DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((reports(rows)?, total))
    }

    async fn delete_reports_except(&self, keep: &[Uuid]) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM reports WHERE NOT (transaction_id = ANY($1))")
            .bind(keep)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn get_summary(&self, user_id: Uuid) -> Result<Option<ReportSummary>, AppError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            "SELECT * FROM report_summaries WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn put_summary(&self, summary: &ReportSummary) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO report_summaries (
                user_id,
                full_name,
                email,
                total_transactions,
                total_credit_cents,
                total_debit_cents,
                current_balance_cents,
                last_transaction_date,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                total_transactions = EXCLUDED.total_transactions,
                total_credit_cents = EXCLUDED.total_credit_cents,
                total_debit_cents = EXCLUDED.total_debit_cents,
                current_balance_cents = EXCLUDED.current_balance_cents,
                last_transaction_date = EXCLUDED.last_transaction_date,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(summary.user_id)
        .bind(&summary.full_name)
        .bind(&summary.email)
        .bind(summary.total_transactions)
        .bind(summary.total_credit_cents)
        .bind(summary.total_debit_cents)
        .bind(summary.current_balance_cents)
        .bind(summary.last_transaction_date)
        .bind(summary.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_summaries_except(&self, keep: &[Uuid]) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM report_summaries WHERE NOT (user_id = ANY($1))")
            .bind(keep)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
