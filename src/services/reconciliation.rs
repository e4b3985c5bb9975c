//! Turns a completed checkout into a posted, reconciled invoice payment.
//!
//! The engine never wraps its steps in one transaction. Each ledger call is
//! idempotent on its own (posting a posted invoice is a no-op, payments are
//! keyed by their communication), and the outcome is persisted on the
//! transaction so a failed run can be picked up again.

use bigdecimal::BigDecimal;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::ledger::{
    ElevatedCredential, InvoiceState, Journal, JournalKind, PaymentMethodLine, PaymentRequest,
};
use crate::domain::status::ReconciliationState;
use crate::domain::transaction::Transaction;
use crate::ports::{
    AccountingLedger, LedgerError, ReconciliationRecord, RepositoryError, TransactionRepository,
};

pub const DEFAULT_JOURNAL_CODE: &str = "CSH1";

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("Invoice {0} not found")]
    MissingInvoice(i64),
    #[error("No payment journal found for company {0}")]
    JournalNotFound(i64),
    #[error("No inbound payment method on journal {0}")]
    PaymentMethodNotFound(String),
    #[error("Invalid payment amount: {0}")]
    InvalidAmount(BigDecimal),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl ReconciliationError {
    /// Stable name reported to callers and stored on the transaction.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconciliationError::MissingInvoice(_) => "MissingInvoice",
            ReconciliationError::JournalNotFound(_) => "JournalNotFound",
            ReconciliationError::PaymentMethodNotFound(_) => "PaymentMethodNotFound",
            ReconciliationError::InvalidAmount(_) => "InvalidAmount",
            ReconciliationError::Ledger(_) => "LedgerError",
            ReconciliationError::Store(_) => "StoreError",
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationReport {
    pub state: ReconciliationState,
    pub payment_id: Option<i64>,
    pub payment_reference: Option<String>,
    pub amount: Option<BigDecimal>,
    /// Set when the payment was posted but no receivable lines were matched.
    pub warning: Option<String>,
}

impl ReconciliationReport {
    fn already_settled() -> Self {
        Self {
            state: ReconciliationState::AlreadySettled,
            payment_id: None,
            payment_reference: None,
            amount: None,
            warning: None,
        }
    }
}

pub struct ReconciliationEngine {
    ledger: Arc<dyn AccountingLedger>,
    transactions: Arc<dyn TransactionRepository>,
    credential: ElevatedCredential,
    journal_code: String,
    provider_label: String,
}

impl ReconciliationEngine {
    pub fn new(
        ledger: Arc<dyn AccountingLedger>,
        transactions: Arc<dyn TransactionRepository>,
        credential: ElevatedCredential,
    ) -> Self {
        Self {
            ledger,
            transactions,
            credential,
            journal_code: DEFAULT_JOURNAL_CODE.to_string(),
            provider_label: "Wave".to_string(),
        }
    }

    pub fn with_journal_code(mut self, code: impl Into<String>) -> Self {
        self.journal_code = code.into();
        self
    }

    pub fn with_provider_label(mut self, label: impl Into<String>) -> Self {
        self.provider_label = label.into();
        self
    }

    /// Runs the engine for a transaction whose reconciliation the caller has
    /// already claimed, and records the outcome on it.
    pub async fn reconcile(
        &self,
        tx: &Transaction,
    ) -> Result<ReconciliationReport, ReconciliationError> {
        let result = self.run(tx).await;

        let record = match &result {
            Ok(report) => ReconciliationRecord {
                state: report.state,
                payment_reference: report.payment_reference.clone(),
                error: report.warning.clone(),
            },
            Err(e) => ReconciliationRecord {
                state: ReconciliationState::Failed,
                payment_reference: None,
                error: Some(format!("{}: {}", e.kind(), e)),
            },
        };
        if let Err(e) = self
            .transactions
            .finish_reconciliation(&tx.transaction_id, record)
            .await
        {
            tracing::error!(
                transaction_id = %tx.transaction_id,
                error = %e,
                "Failed to record reconciliation outcome"
            );
            // A lost outcome leaves the claim stuck in progress; surface it.
            if result.is_ok() {
                return Err(e.into());
            }
        }

        match &result {
            Ok(report) => tracing::info!(
                transaction_id = %tx.transaction_id,
                invoice_id = tx.invoice_id,
                state = %report.state,
                payment_id = ?report.payment_id,
                "Reconciliation finished"
            ),
            Err(e) => tracing::error!(
                transaction_id = %tx.transaction_id,
                invoice_id = tx.invoice_id,
                kind = e.kind(),
                error = %e,
                "Reconciliation failed"
            ),
        }
        result
    }

    async fn run(&self, tx: &Transaction) -> Result<ReconciliationReport, ReconciliationError> {
        let mut invoice = self
            .ledger
            .find_invoice(tx.invoice_id)
            .await?
            .ok_or(ReconciliationError::MissingInvoice(tx.invoice_id))?;

        if invoice.state == InvoiceState::Draft {
            tracing::info!(invoice = %invoice.name, "Posting draft invoice before payment");
            invoice = self.ledger.post_invoice(&self.credential, invoice.id).await?;
        }

        let zero = BigDecimal::from(0);
        if invoice.amount_residual <= zero {
            tracing::info!(
                transaction_id = %tx.transaction_id,
                invoice = %invoice.name,
                "Invoice already settled, no payment registered"
            );
            return Ok(ReconciliationReport::already_settled());
        }
        let amount = if tx.amount < invoice.amount_residual {
            tx.amount.clone()
        } else {
            invoice.amount_residual.clone()
        };
        if amount <= zero {
            return Err(ReconciliationError::InvalidAmount(amount));
        }

        let journals = self.ledger.journals(invoice.company_id).await?;
        let journal = select_journal(&journals, &self.journal_code)
            .ok_or(ReconciliationError::JournalNotFound(invoice.company_id))?;

        let method_line = match select_method_line(journal) {
            Some(line) => line.clone(),
            None => self
                .ledger
                .create_inbound_method_line(&self.credential, journal.id)
                .await?
                .ok_or_else(|| ReconciliationError::PaymentMethodNotFound(journal.to_string()))?,
        };

        let communication = self.communication(tx, &invoice.name);
        let request = PaymentRequest {
            invoice_id: invoice.id,
            amount: amount.clone(),
            journal_id: journal.id,
            method_line_id: method_line.id,
            payment_date: tx
                .completed_at
                .map(|ts| ts.date())
                .unwrap_or_else(|| Utc::now().date_naive()),
            communication: communication.clone(),
        };
        let payment = self.ledger.register_payment(&self.credential, &request).await?;
        if !payment.created {
            tracing::info!(
                transaction_id = %tx.transaction_id,
                payment_id = payment.id,
                "Payment already registered for this checkout, reusing it"
            );
        }

        let outcome = match self
            .ledger
            .reconcile(&self.credential, invoice.id, payment.id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    transaction_id = %tx.transaction_id,
                    payment_id = payment.id,
                    invoice = %invoice.name,
                    error = %e,
                    "Payment posted but reconciliation failed; needs manual recovery"
                );
                return Err(e.into());
            }
        };

        let mut report = ReconciliationReport {
            state: ReconciliationState::Settled,
            payment_id: Some(payment.id),
            payment_reference: Some(communication),
            amount: Some(payment.amount),
            warning: None,
        };
        if !outcome.matched_anything() {
            let warning = format!(
                "No receivable lines to reconcile (invoice: {}, payment: {})",
                outcome.invoice_lines, outcome.payment_lines
            );
            tracing::warn!(
                transaction_id = %tx.transaction_id,
                payment_id = payment.id,
                invoice = %invoice.name,
                "{}",
                warning
            );
            report.state = ReconciliationState::PartiallyReconciled;
            report.warning = Some(warning);
        }
        Ok(report)
    }

    fn communication(&self, tx: &Transaction, invoice_name: &str) -> String {
        match &tx.provider_session_id {
            Some(session_id) => format!("{} {}", self.provider_label, session_id),
            None => invoice_name.to_string(),
        }
    }
}

/// Configured code first, then the first bank journal, then the first cash one.
/// A configured code naming a sale or general journal is skipped.
pub fn select_journal<'a>(journals: &'a [Journal], code: &str) -> Option<&'a Journal> {
    journals
        .iter()
        .find(|journal| journal.code == code && journal.kind.accepts_payments())
        .or_else(|| journals.iter().find(|journal| journal.kind == JournalKind::Bank))
        .or_else(|| journals.iter().find(|journal| journal.kind == JournalKind::Cash))
}

pub fn select_method_line(journal: &Journal) -> Option<&PaymentMethodLine> {
    journal
        .inbound_method_lines
        .iter()
        .find(|line| line.is_manual())
        .or_else(|| journal.inbound_method_lines.first())
}
