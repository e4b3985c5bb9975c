pub mod ledger;
pub mod status;
pub mod transaction;

pub use ledger::{ElevatedCredential, Invoice, Journal, PaymentMethodLine};
pub use status::{map_status, ReconciliationState, TransactionStatus};
pub use transaction::{NewTransaction, Observation, StatusUpdate, Transaction, TransactionView};
