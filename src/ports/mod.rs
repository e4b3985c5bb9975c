//! Boundaries to the systems this service orchestrates but does not own.
//!
//! Each trait has a Postgres adapter for production and an in-memory one
//! under `adapters::memory`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ledger::{
    ElevatedCredential, Invoice, Journal, Partner, PaymentMethodLine, PaymentRequest,
    ReconcileOutcome, RegisteredPayment,
};
use crate::domain::status::ReconciliationState;
use crate::domain::transaction::{NewTransaction, Observation, StatusUpdate, Transaction};
use crate::provider::ProviderCredentials;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("transaction {0} already exists")]
    DuplicateTransaction(String),
    /// The provider handed out a session id already linked to another
    /// transaction.
    #[error("provider session {0} already linked to another transaction")]
    DuplicateSession(String),
    #[error("transaction {0} not found")]
    NotFound(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Outcome of a reconciliation run, persisted on the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationRecord {
    pub state: ReconciliationState,
    pub payment_reference: Option<String>,
    pub error: Option<String>,
}

/// Persistence for payment attempts.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> RepositoryResult<Option<Transaction>>;

    async fn find_by_provider_session_id(
        &self,
        session_id: &str,
    ) -> RepositoryResult<Option<Transaction>>;

    /// Inserts a pending transaction. Fails with
    /// [`RepositoryError::DuplicateTransaction`] when the id is taken; the
    /// check is atomic with the insert.
    async fn create(&self, input: NewTransaction) -> RepositoryResult<Transaction>;

    /// Records a provider observation. Raw provider fields are always
    /// refreshed; the status only moves out of `pending`, and
    /// `completed_at` is only written on the first entry into `completed`.
    async fn update_status(
        &self,
        transaction_id: &str,
        observation: Observation,
    ) -> RepositoryResult<StatusUpdate>;

    /// Atomically moves the reconciliation from a claimable state to
    /// `in_progress`. Returns false when another caller holds or finished it.
    async fn claim_reconciliation(&self, transaction_id: &str) -> RepositoryResult<bool>;

    /// Like [`claim_reconciliation`](Self::claim_reconciliation) but also
    /// takes over a run stuck in `in_progress`. Finished runs are refused.
    async fn reclaim_reconciliation(&self, transaction_id: &str) -> RepositoryResult<bool>;

    async fn finish_reconciliation(
        &self,
        transaction_id: &str,
        record: ReconciliationRecord,
    ) -> RepositoryResult<Transaction>;

    async fn list_by_invoice(&self, invoice_id: i64) -> RepositoryResult<Vec<Transaction>>;
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invoice {0} not found")]
    InvoiceNotFound(i64),
    #[error("journal {0} not found")]
    JournalNotFound(i64),
    #[error("ledger rejected the operation: {0}")]
    Rejected(String),
    #[error("corrupt ledger record: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// The accounting system: invoices, partners, journals and payments.
#[async_trait]
pub trait AccountingLedger: Send + Sync {
    async fn find_invoice(&self, invoice_id: i64) -> LedgerResult<Option<Invoice>>;

    async fn find_partner(&self, partner_id: i64) -> LedgerResult<Option<Partner>>;

    /// Posts a draft invoice. Posting an already posted invoice is a no-op.
    async fn post_invoice(
        &self,
        credential: &ElevatedCredential,
        invoice_id: i64,
    ) -> LedgerResult<Invoice>;

    /// All journals of a company, with their inbound payment method lines.
    async fn journals(&self, company_id: i64) -> LedgerResult<Vec<Journal>>;

    async fn create_inbound_method_line(
        &self,
        credential: &ElevatedCredential,
        journal_id: i64,
    ) -> LedgerResult<Option<PaymentMethodLine>>;

    /// Registers and posts a payment. Returns the existing payment when the
    /// communication was already used on this invoice.
    async fn register_payment(
        &self,
        credential: &ElevatedCredential,
        request: &PaymentRequest,
    ) -> LedgerResult<RegisteredPayment>;

    /// Matches the invoice's open receivable lines against the payment's.
    async fn reconcile(
        &self,
        credential: &ElevatedCredential,
        invoice_id: i64,
        payment_id: i64,
    ) -> LedgerResult<ReconcileOutcome>;
}

/// Where the active provider credentials live.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn active(&self) -> RepositoryResult<Option<ProviderCredentials>>;
}
