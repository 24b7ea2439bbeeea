//! Data models representing database entities and API bodies.

/// Balance Ledger account model
pub mod account;
/// Notification model and delivery payload
pub mod notification;
/// Report rows and per-user summaries
pub mod report;
/// Transaction intents and settlement status
pub mod transaction;
