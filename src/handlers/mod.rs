//! HTTP request handlers (route handlers).
//!
//! Each handler extracts request data, calls one service operation and
//! returns JSON. Errors become the standard `{"error": {...}}` body.

/// Balance Ledger endpoints (internal)
pub mod accounts;
pub mod health;
/// Notification Dispatcher endpoints (internal)
pub mod notifications;
pub mod reports;
pub mod sync;
pub mod transactions;
