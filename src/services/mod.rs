pub mod reconciliation;
pub mod status_sync;

pub use reconciliation::{ReconciliationEngine, ReconciliationError, ReconciliationReport};
pub use status_sync::{StatusSync, SyncOutcome};
