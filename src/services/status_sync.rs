//! The single path from a provider snapshot to the stored transaction.
//!
//! Polling and the webhook both land here, so identical provider input
//! always produces the identical stored status.

use std::sync::Arc;

use crate::domain::status::ReconciliationState;
use crate::domain::transaction::{Observation, ObservationSource, Transaction};
use crate::ports::{RepositoryError, TransactionRepository};
use crate::provider::CheckoutSession;
use crate::services::reconciliation::{
    ReconciliationEngine, ReconciliationError, ReconciliationReport,
};

/// What one synchronization did.
#[derive(Debug)]
pub struct SyncOutcome {
    /// The stored transaction after the update and any reconciliation.
    pub transaction: Transaction,
    pub status_changed: bool,
    /// `None` when this call did not run the engine: not completed, already
    /// reconciled, or another caller holds the claim.
    pub reconciliation: Option<Result<ReconciliationReport, ReconciliationError>>,
}

impl SyncOutcome {
    pub fn reconciliation_error(&self) -> Option<&ReconciliationError> {
        self.reconciliation.as_ref().and_then(|r| r.as_ref().err())
    }
}

/// Builds the observation for a provider session snapshot.
pub fn observe(session: &CheckoutSession, source: ObservationSource) -> Observation {
    Observation {
        status: session.internal_status(),
        checkout_status: session.checkout_status.clone(),
        payment_status: session.payment_status.clone(),
        completed_at: session.completed_at(),
        raw_payload: session.raw.clone(),
        source,
    }
}

pub struct StatusSync {
    transactions: Arc<dyn TransactionRepository>,
    engine: Arc<ReconciliationEngine>,
}

impl StatusSync {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        engine: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            transactions,
            engine,
        }
    }

    pub async fn apply_session(
        &self,
        transaction_id: &str,
        session: &CheckoutSession,
        source: ObservationSource,
    ) -> Result<SyncOutcome, RepositoryError> {
        self.apply(transaction_id, observe(session, source)).await
    }

    pub async fn apply(
        &self,
        transaction_id: &str,
        observation: Observation,
    ) -> Result<SyncOutcome, RepositoryError> {
        let source = observation.source;
        let update = self
            .transactions
            .update_status(transaction_id, observation)
            .await?;

        if let Some(transition) = update.transition {
            tracing::info!(
                transaction_id,
                from = %transition.from,
                to = %transition.to,
                source = ?source,
                "Transaction status changed"
            );
        }
        let status_changed = update.transition.is_some();

        let reconciliation = self.reconcile_if_needed(&update.transaction, false).await?;
        let transaction = match reconciliation {
            Some(_) => self.reload(transaction_id).await?,
            None => update.transaction,
        };

        Ok(SyncOutcome {
            transaction,
            status_changed,
            reconciliation,
        })
    }

    /// Re-runs reconciliation for a completed transaction, e.g. after a
    /// failed attempt. With `force`, a run left `in_progress` is taken over;
    /// the ledger keys payments by communication, so this cannot pay twice.
    /// `reconciliation` is `None` when there is nothing to do.
    pub async fn retry_reconciliation(
        &self,
        transaction_id: &str,
        force: bool,
    ) -> Result<SyncOutcome, RepositoryError> {
        let tx = self.reload(transaction_id).await?;
        let reconciliation = self.reconcile_if_needed(&tx, force).await?;
        let transaction = match reconciliation {
            Some(_) => self.reload(transaction_id).await?,
            None => tx,
        };
        Ok(SyncOutcome {
            transaction,
            status_changed: false,
            reconciliation,
        })
    }

    async fn reconcile_if_needed(
        &self,
        tx: &Transaction,
        force: bool,
    ) -> Result<Option<Result<ReconciliationReport, ReconciliationError>>, RepositoryError> {
        if !tx.needs_reconciliation() {
            return Ok(None);
        }
        let claimed = if force {
            if tx.reconciliation_state == ReconciliationState::InProgress {
                tracing::warn!(
                    transaction_id = %tx.transaction_id,
                    "Taking over a reconciliation left in progress"
                );
            }
            self.transactions
                .reclaim_reconciliation(&tx.transaction_id)
                .await?
        } else {
            self.transactions
                .claim_reconciliation(&tx.transaction_id)
                .await?
        };
        if !claimed {
            tracing::debug!(
                transaction_id = %tx.transaction_id,
                "Reconciliation already claimed elsewhere"
            );
            return Ok(None);
        }
        Ok(Some(self.engine.reconcile(tx).await))
    }

    async fn reload(&self, transaction_id: &str) -> Result<Transaction, RepositoryError> {
        self.transactions
            .find_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(transaction_id.to_string()))
    }
}
