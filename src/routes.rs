//! HTTP router.
//!
//! Public routes serve end users; internal routes (`/internal/*` and
//! `/notifications*`) require the `X-Service-Token` header.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::AppState};

pub fn router(state: AppState) -> Router {
    let internal_routes = Router::new()
        // Balance Ledger
        .route(
            "/internal/accounts",
            post(handlers::accounts::create_account).get(handlers::accounts::list_accounts),
        )
        .route(
            "/internal/accounts/{user_id}",
            get(handlers::accounts::get_account),
        )
        .route(
            "/internal/accounts/{user_id}/balance",
            get(handlers::accounts::get_balance).put(handlers::accounts::update_balance),
        )
        // Notification Dispatcher
        .route(
            "/notifications",
            post(handlers::notifications::create_notification)
                .get(handlers::notifications::list_notifications),
        )
        .route(
            "/notifications/{id}",
            get(handlers::notifications::get_notification),
        )
        .route(
            "/notifications/user/{user_id}",
            get(handlers::notifications::list_user_notifications),
        )
        .route(
            "/notifications/{id}/send",
            post(handlers::notifications::send_notification),
        )
        .route(
            "/notifications/{id}/resend",
            post(handlers::notifications::resend_notification),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_service_token,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        // Transaction Ledger
        .route(
            "/transactions",
            post(handlers::transactions::create_transaction)
                .get(handlers::transactions::list_transactions),
        )
        .route(
            "/transactions/{id}",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/transactions/user/{user_id}",
            get(handlers::transactions::list_user_transactions),
        )
        // Report Aggregator
        .route("/reports", post(handlers::reports::create_report))
        .route(
            "/reports/user/{user_id}",
            get(handlers::reports::list_user_reports),
        )
        .route(
            "/summaries/user/{user_id}",
            get(handlers::reports::get_user_summary),
        )
        .route("/sync/all", post(handlers::sync::sync_all))
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
