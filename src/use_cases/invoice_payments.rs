//! Invoice payments use case.
//! Lists an invoice's checkout attempts with coverage statistics.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use crate::domain::ledger::Invoice;
use crate::domain::status::TransactionStatus;
use crate::domain::transaction::Transaction;
use crate::ports::{AccountingLedger, LedgerError, RepositoryError, TransactionRepository};

/// How much of the invoice total the completed transactions cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentCoverage {
    None,
    Partial,
    Full,
    Overpaid,
}

impl PaymentCoverage {
    pub fn of(paid: &BigDecimal, total: &BigDecimal) -> Self {
        if paid <= &BigDecimal::from(0) {
            PaymentCoverage::None
        } else if paid < total {
            PaymentCoverage::Partial
        } else if paid == total {
            PaymentCoverage::Full
        } else {
            PaymentCoverage::Overpaid
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PaymentStats {
    pub transaction_count: usize,
    pub completed_count: usize,
    #[schema(value_type = String)]
    pub total_completed: BigDecimal,
    pub coverage: PaymentCoverage,
}

impl PaymentStats {
    pub fn compute(invoice: &Invoice, transactions: &[Transaction]) -> Self {
        let completed: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Completed)
            .collect();
        let total_completed = completed
            .iter()
            .fold(BigDecimal::from(0), |acc, tx| acc + &tx.amount);

        Self {
            transaction_count: transactions.len(),
            completed_count: completed.len(),
            coverage: PaymentCoverage::of(&total_completed, &invoice.amount_total),
            total_completed,
        }
    }
}

#[derive(Debug)]
pub struct InvoicePaymentsOutput {
    pub invoice: Invoice,
    pub transactions: Vec<Transaction>,
    pub stats: PaymentStats,
}

#[derive(Debug, Error)]
pub enum InvoicePaymentsError {
    #[error("Invoice {0} not found")]
    InvoiceNotFound(i64),
    #[error(transparent)]
    Store(#[from] RepositoryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct InvoicePayments {
    transactions: Arc<dyn TransactionRepository>,
    ledger: Arc<dyn AccountingLedger>,
}

impl InvoicePayments {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<dyn AccountingLedger>,
    ) -> Self {
        Self {
            transactions,
            ledger,
        }
    }

    pub async fn execute(
        &self,
        invoice_id: i64,
    ) -> Result<InvoicePaymentsOutput, InvoicePaymentsError> {
        let invoice = self
            .ledger
            .find_invoice(invoice_id)
            .await?
            .ok_or(InvoicePaymentsError::InvoiceNotFound(invoice_id))?;
        let transactions = self.transactions.list_by_invoice(invoice_id).await?;
        let stats = PaymentStats::compute(&invoice, &transactions);

        Ok(InvoicePaymentsOutput {
            invoice,
            transactions,
            stats,
        })
    }
}
