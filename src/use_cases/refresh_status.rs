//! Refresh status use case.
//! Polls the provider for a stored transaction and feeds the snapshot
//! through Status Sync.

use std::sync::Arc;
use thiserror::Error;

use crate::domain::ledger::Invoice;
use crate::domain::transaction::{ObservationSource, Transaction};
use crate::ports::{AccountingLedger, CredentialSource, RepositoryError, TransactionRepository};
use crate::provider::CheckoutClient;
use crate::services::reconciliation::{ReconciliationError, ReconciliationReport};
use crate::services::status_sync::StatusSync;

#[derive(Debug)]
pub struct RefreshStatusOutput {
    pub transaction: Transaction,
    /// False when the provider could not be asked and the stored state is
    /// returned as is.
    pub refreshed: bool,
    pub reconciliation: Option<Result<ReconciliationReport, ReconciliationError>>,
    /// The invoice as it stands after this refresh; `None` if the ledger
    /// could not be read.
    pub invoice: Option<Invoice>,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Transaction not found")]
    TransactionNotFound(String),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

pub struct RefreshStatus {
    transactions: Arc<dyn TransactionRepository>,
    ledger: Arc<dyn AccountingLedger>,
    credentials: Arc<dyn CredentialSource>,
    client: CheckoutClient,
    sync: Arc<StatusSync>,
}

impl RefreshStatus {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<dyn AccountingLedger>,
        credentials: Arc<dyn CredentialSource>,
        client: CheckoutClient,
        sync: Arc<StatusSync>,
    ) -> Self {
        Self {
            transactions,
            ledger,
            credentials,
            client,
            sync,
        }
    }

    pub async fn execute(&self, transaction_id: &str) -> Result<RefreshStatusOutput, RefreshError> {
        let mut output = self.refresh(transaction_id).await?;
        output.invoice = self.invoice_summary(&output.transaction).await;
        Ok(output)
    }

    async fn invoice_summary(&self, tx: &Transaction) -> Option<Invoice> {
        match self.ledger.find_invoice(tx.invoice_id).await {
            Ok(invoice) => invoice,
            Err(e) => {
                tracing::warn!(
                    transaction_id = %tx.transaction_id,
                    invoice_id = tx.invoice_id,
                    error = %e,
                    "Could not load invoice for status response"
                );
                None
            }
        }
    }

    async fn refresh(&self, transaction_id: &str) -> Result<RefreshStatusOutput, RefreshError> {
        let tx = self
            .transactions
            .find_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| RefreshError::TransactionNotFound(transaction_id.to_string()))?;

        let stale = |transaction: Transaction| RefreshStatusOutput {
            transaction,
            refreshed: false,
            reconciliation: None,
            invoice: None,
        };

        let Some(session_id) = tx.provider_session_id.clone() else {
            return Ok(stale(tx));
        };
        let Some(credentials) = self.credentials.active().await? else {
            tracing::warn!(transaction_id, "No active provider configuration, returning stored status");
            return Ok(stale(tx));
        };

        let session = match self.client.get_session(&session_id, &credentials).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!(transaction_id, session_id = %session_id, "Provider does not know this session");
                return Ok(stale(tx));
            }
            Err(e) => {
                tracing::warn!(
                    transaction_id,
                    session_id = %session_id,
                    error = %e,
                    "Status refresh failed, returning stored status"
                );
                return Ok(stale(tx));
            }
        };

        let outcome = self
            .sync
            .apply_session(transaction_id, &session, ObservationSource::Poll)
            .await?;

        Ok(RefreshStatusOutput {
            transaction: outcome.transaction,
            refreshed: true,
            reconciliation: outcome.reconciliation,
            invoice: None,
        })
    }
}
