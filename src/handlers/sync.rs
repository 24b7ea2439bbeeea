//! Reconciliation endpoint.

use axum::{Json, extract::State};

use crate::{error::AppError, models::report::SyncResult, state::AppState};

/// Rebuild every report and summary from the ledgers.
///
/// # Response (200 OK)
///
/// ```json
/// { "synced_reports": 42, "synced_users": 7 }
/// ```
///
/// A run already in progress answers 409 `sync_in_progress`.
pub async fn sync_all(State(state): State<AppState>) -> Result<Json<SyncResult>, AppError> {
    Ok(Json(state.sync.sync_all().await?))
}
