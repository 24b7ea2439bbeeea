//! Wallet Settlement - Main Application Entry Point
//!
//! A wallet backend that accepts credit/debit transactions, settles them
//! asynchronously against a Balance Ledger, notifies users of the outcome and
//! maintains per-transaction reports and per-user summaries that can be
//! reconciled from the ledgers on demand.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Settlement**: partitioned in-process queue drained by background tasks
//! - **Collaborators**: in-process, or remote over HTTP when their URL is set
//! - **Authentication**: shared service token (SHA-256 compared) on internal routes
//!
//! # Startup Flow
//!
//! 1. Load and validate configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Build services and start the settlement partitions
//! 4. Fail deliveries and re-enqueue transactions a previous run left in flight
//! 5. Serve HTTP until Ctrl-C / SIGTERM, then drain settlements and close the pool

mod clients;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod repository;
mod routes;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

use crate::state::{AppState, Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    config.validate()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let (state, settlement_tasks) = AppState::build(Stores::postgres(pool.clone()), &config)?;
    state.notifications.release_interrupted().await?;
    state.transactions.recover_pending().await?;

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and every queue sender) is gone; let queued settlements finish
    tracing::info!("Draining settlement queue");
    for task in settlement_tasks {
        if let Err(e) = task.await {
            tracing::error!("Settlement task panicked: {}", e);
        }
    }

    pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
