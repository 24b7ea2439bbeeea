//! Service token authentication middleware.
//!
//! Guards the internal routes (`/internal/*`, `/notifications*`), which are
//! only meant to be called by sibling services. The middleware:
//! 1. Extracts the token from the `X-Service-Token` header
//! 2. Hashes it with SHA-256
//! 3. Compares the digest with the digest of the configured token
//! 4. Rejects a missing or wrong token with HTTP 401

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::clients::SERVICE_TOKEN_HEADER;
use crate::error::AppError;
use crate::state::{AppState, hash_token};

/// Service token middleware function.
///
/// # Headers
///
/// Expected header format:
/// ```text
/// X-Service-Token: <token>
/// ```
///
/// # Returns
///
/// - The next handler's response when the token matches
/// - `Err(AppError::Unauthorized)` otherwise (401)
pub async fn require_service_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(SERVICE_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if hash_token(token) != *state.service_token_hash {
        tracing::warn!(path = %request.uri().path(), "rejected service token");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
