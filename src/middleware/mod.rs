//! HTTP middleware components.
//!
//! Middleware run before route handlers and can short-circuit a request,
//! e.g. reject a caller without a valid service token.

/// Service token authentication for internal routes
pub mod auth;
