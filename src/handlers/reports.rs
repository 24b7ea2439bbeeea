//! Report Aggregator HTTP handlers.
//!
//! - POST /reports - Snapshot one transaction
//! - GET /reports/user/{user_id}?page&per_page - Paginated reports
//! - GET /summaries/user/{user_id} - Per-user summary

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::report::{CreateReportRequest, Report, ReportPage, ReportPageQuery, ReportSummary},
    state::AppState,
};

/// Create the report of a transaction.
///
/// # Request Body
///
/// ```json
/// {
///   "user_id": "550e8400-...",
///   "transaction_id": "770e8400-..."
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: a new report
/// - **200 OK**: the report already existed and is returned unchanged
/// - **404**: unknown transaction or user
/// - **400**: the transaction belongs to another user
pub async fn create_report(
    State(state): State<AppState>,
    Json(request): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    let (report, created) = state
        .reports
        .create_report(request.user_id, request.transaction_id)
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}

/// # Response (200 OK)
///
/// ```json
/// {
///   "data": [ ... ],
///   "total": 3,
///   "page": 1,
///   "per_page": 50,
///   "total_pages": 1
/// }
/// ```
pub async fn list_user_reports(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ReportPageQuery>,
) -> Result<Json<ReportPage>, AppError> {
    Ok(Json(state.reports.list_reports(user_id, query).await?))
}

pub async fn get_user_summary(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ReportSummary>, AppError> {
    Ok(Json(state.reports.get_summary(user_id).await?))
}
