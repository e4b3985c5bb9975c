pub mod memory;
pub mod postgres_credentials;
pub mod postgres_ledger;
pub mod postgres_transaction_repository;
pub mod static_credentials;

pub use memory::{InMemoryLedger, InMemoryTransactionRepository};
pub use postgres_credentials::PostgresCredentialSource;
pub use postgres_ledger::PostgresLedger;
pub use postgres_transaction_repository::PostgresTransactionRepository;
pub use static_credentials::StaticCredentialSource;
