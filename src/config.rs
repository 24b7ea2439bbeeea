//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables
//! into a type-safe struct.

use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVICE_TOKEN` (required): shared credential for `/internal/*` and `/notifications` routes
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `BALANCE_LEDGER_URL` (optional): remote Balance Ledger; in-process ledger when unset
/// - `NOTIFICATION_SERVICE_URL` (optional): remote dispatcher; in-process dispatcher when unset
/// - `NOTIFICATION_WEBHOOK_URL` / `NOTIFICATION_WEBHOOK_SECRET` (optional): signed webhook delivery
/// - `NOTIFICATION_AUTO_SEND` (optional): deliver notifications right after creation
/// - `UPSTREAM_TIMEOUT_SECS` / `MUTATION_TIMEOUT_SECS` (optional): outbound call timeouts
/// - `SETTLEMENT_PARTITIONS` (optional): number of sequential settlement lanes
/// - `DEFAULT_PAGE_SIZE` / `MAX_PAGE_SIZE` (optional): report pagination
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub service_token: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub balance_ledger_url: Option<String>,

    #[serde(default)]
    pub notification_service_url: Option<String>,

    #[serde(default)]
    pub notification_webhook_url: Option<String>,

    #[serde(default)]
    pub notification_webhook_secret: Option<String>,

    #[serde(default)]
    pub notification_auto_send: bool,

    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    #[serde(default = "default_mutation_timeout")]
    pub mutation_timeout_secs: u64,

    #[serde(default = "default_partitions")]
    pub settlement_partitions: usize,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    #[serde(default = "max_page_size")]
    pub max_page_size: u32,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_upstream_timeout() -> u64 {
    5
}

fn default_mutation_timeout() -> u64 {
    10
}

fn default_partitions() -> usize {
    4
}

fn default_page_size() -> u32 {
    50
}

fn max_page_size() -> u32 {
    100
}

fn default_max_connections() -> u32 {
    5
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Reject combinations that would only fail later at runtime.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.service_token.trim().is_empty() {
            return Err(AppError::Validation(
                "SERVICE_TOKEN must not be empty".to_string(),
            ));
        }
        if self.settlement_partitions == 0 {
            return Err(AppError::Validation(
                "SETTLEMENT_PARTITIONS must be at least 1".to_string(),
            ));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(AppError::Validation(
                "DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE".to_string(),
            ));
        }
        if self.notification_webhook_url.is_some() && self.notification_webhook_secret.is_none() {
            return Err(AppError::Validation(
                "NOTIFICATION_WEBHOOK_SECRET is required with NOTIFICATION_WEBHOOK_URL"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_secs(self.mutation_timeout_secs)
    }
}

#[cfg(test)]
impl Config {
    /// Configuration used by in-memory tests; never read from the environment.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://unused".to_string(),
            service_token: "test-token".to_string(),
            server_port: 0,
            balance_ledger_url: None,
            notification_service_url: None,
            notification_webhook_url: None,
            notification_webhook_secret: None,
            notification_auto_send: false,
            upstream_timeout_secs: 5,
            mutation_timeout_secs: 10,
            settlement_partitions: 2,
            default_page_size: 50,
            max_page_size: 100,
            database_max_connections: 1,
        }
    }
}
