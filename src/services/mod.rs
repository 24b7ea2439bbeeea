//! Business logic services.
//!
//! Services contain the core logic separated from HTTP handlers. They reach
//! storage through the repository traits and other authorities through the
//! collaborator traits in `clients`.

pub mod delivery;
pub mod ledger_service;
pub mod notification_service;
pub mod report_service;
/// Background settlement worker and partitioned queue
pub mod settlement;
pub mod sync_service;
pub mod transaction_service;
