//! HTTP clients for remote collaborators.
//!
//! Every call carries the `X-Service-Token` header and a fixed timeout. A
//! timeout or connection failure becomes `UpstreamUnavailable` and is never
//! retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use crate::clients::{BalanceLedger, Notifier, SERVICE_TOKEN_HEADER};
use crate::error::AppError;
use crate::models::account::{Account, BalanceAction, BalanceMutationRequest};
use crate::models::notification::{CreateNotificationRequest, Notification};

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Map a transport failure.
fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() || e.is_connect() {
        AppError::UpstreamUnavailable(e.to_string())
    } else {
        AppError::Upstream(e.to_string())
    }
}

/// Map a non-success response, reading the `{"error": {...}}` body when present.
async fn response_error(response: Response, resource: String) -> AppError {
    let status = response.status();
    let body = response.json::<ErrorEnvelope>().await.ok().map(|e| e.error);

    match (status, body) {
        (StatusCode::NOT_FOUND, _) => AppError::NotFound(resource),
        (_, Some(body)) if body.code == "insufficient_funds" => AppError::InsufficientFunds,
        (StatusCode::BAD_REQUEST, Some(body)) => AppError::Validation(body.message),
        (StatusCode::SERVICE_UNAVAILABLE, body) => AppError::UpstreamUnavailable(
            body.map(|b| b.message)
                .unwrap_or_else(|| status.to_string()),
        ),
        (_, Some(body)) => AppError::Upstream(format!("{status}: {}", body.message)),
        (_, None) => AppError::Upstream(status.to_string()),
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Remote Balance Ledger speaking `/internal/accounts/*`.
#[derive(Clone)]
pub struct HttpBalanceLedger {
    client: reqwest::Client,
    base_url: String,
    service_token: String,
    mutation_timeout: Duration,
}

impl HttpBalanceLedger {
    pub fn new(
        base_url: &str,
        service_token: &str,
        timeout: Duration,
        mutation_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token: service_token.to_string(),
            mutation_timeout,
        })
    }
}

#[async_trait]
impl BalanceLedger for HttpBalanceLedger {
    async fn get_account(&self, user_id: Uuid) -> Result<Account, AppError> {
        let response = self
            .client
            .get(format!("{}/internal/accounts/{}", self.base_url, user_id))
            .header(SERVICE_TOKEN_HEADER, &self.service_token)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(response_error(response, format!("user {user_id}")).await);
        }
        response.json().await.map_err(transport_error)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        let response = self
            .client
            .get(format!("{}/internal/accounts", self.base_url))
            .header(SERVICE_TOKEN_HEADER, &self.service_token)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(response_error(response, "user directory".to_string()).await);
        }
        response.json().await.map_err(transport_error)
    }

    async fn mutate(
        &self,
        user_id: Uuid,
        action: BalanceAction,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> Result<Account, AppError> {
        let body = BalanceMutationRequest {
            action,
            amount_cents,
            idempotency_key: Some(idempotency_key.to_string()),
        };

        let response = self
            .client
            .put(format!("{}/internal/accounts/{}/balance", self.base_url, user_id))
            .header(SERVICE_TOKEN_HEADER, &self.service_token)
            .timeout(self.mutation_timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(response_error(response, format!("user {user_id}")).await);
        }
        response.json().await.map_err(transport_error)
    }
}

/// Remote Notification Dispatcher speaking `POST /notifications`.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
    service_token: String,
}

impl HttpNotifier {
    pub fn new(
        base_url: &str,
        service_token: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token: service_token.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, user_id: Uuid, message: &str) -> Result<Notification, AppError> {
        let body = CreateNotificationRequest {
            user_id,
            message: message.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/notifications", self.base_url))
            .header(SERVICE_TOKEN_HEADER, &self.service_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() != StatusCode::CREATED {
            return Err(response_error(response, format!("user {user_id}")).await);
        }
        response.json().await.map_err(transport_error)
    }
}
