//! In-memory implementations of the ports, for tests and local runs.
//!
//! Locks are `parking_lot` mutexes and are never held across an `.await`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::domain::ledger::{
    ElevatedCredential, Invoice, InvoicePaymentState, InvoiceState, Journal, Partner,
    PaymentMethodLine, PaymentRequest, ReconcileOutcome, RegisteredPayment,
};
use crate::domain::status::ReconciliationState;
use crate::domain::transaction::{NewTransaction, Observation, StatusUpdate, Transaction};
use crate::ports::{
    AccountingLedger, LedgerError, LedgerResult, ReconciliationRecord, RepositoryError,
    RepositoryResult, TransactionRepository,
};

/// Transactions keyed by the caller's idempotency key.
#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: Mutex<HashMap<String, Transaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.lock().is_empty()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        Ok(self.transactions.lock().get(transaction_id).cloned())
    }

    async fn find_by_provider_session_id(
        &self,
        session_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        Ok(self
            .transactions
            .lock()
            .values()
            .find(|tx| tx.provider_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn create(&self, input: NewTransaction) -> RepositoryResult<Transaction> {
        let mut transactions = self.transactions.lock();
        if transactions.contains_key(&input.transaction_id) {
            return Err(RepositoryError::DuplicateTransaction(input.transaction_id));
        }
        let session_taken = transactions
            .values()
            .any(|tx| tx.provider_session_id.as_deref() == Some(input.provider_session_id.as_str()));
        if session_taken {
            return Err(RepositoryError::DuplicateSession(input.provider_session_id));
        }

        let tx = Transaction::new(input);
        transactions.insert(tx.transaction_id.clone(), tx.clone());
        Ok(tx)
    }

    async fn update_status(
        &self,
        transaction_id: &str,
        observation: Observation,
    ) -> RepositoryResult<StatusUpdate> {
        let mut transactions = self.transactions.lock();
        let tx = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| RepositoryError::NotFound(transaction_id.to_string()))?;

        let transition = tx.apply(&observation, Utc::now());
        Ok(StatusUpdate {
            transaction: tx.clone(),
            transition,
        })
    }

    async fn claim_reconciliation(&self, transaction_id: &str) -> RepositoryResult<bool> {
        let mut transactions = self.transactions.lock();
        let tx = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| RepositoryError::NotFound(transaction_id.to_string()))?;

        if !tx.reconciliation_state.is_claimable() {
            return Ok(false);
        }
        tx.reconciliation_state = ReconciliationState::InProgress;
        tx.reconciliation_error = None;
        Ok(true)
    }

    async fn reclaim_reconciliation(&self, transaction_id: &str) -> RepositoryResult<bool> {
        let mut transactions = self.transactions.lock();
        let tx = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| RepositoryError::NotFound(transaction_id.to_string()))?;

        if !tx.reconciliation_state.is_reclaimable() {
            return Ok(false);
        }
        tx.reconciliation_state = ReconciliationState::InProgress;
        tx.reconciliation_error = None;
        Ok(true)
    }

    async fn finish_reconciliation(
        &self,
        transaction_id: &str,
        record: ReconciliationRecord,
    ) -> RepositoryResult<Transaction> {
        let mut transactions = self.transactions.lock();
        let tx = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| RepositoryError::NotFound(transaction_id.to_string()))?;

        tx.reconciliation_state = record.state;
        tx.reconciliation_error = record.error;
        if record.payment_reference.is_some() {
            tx.payment_reference = record.payment_reference;
        }
        tx.updated_at = Utc::now();
        Ok(tx.clone())
    }

    async fn list_by_invoice(&self, invoice_id: i64) -> RepositoryResult<Vec<Transaction>> {
        let mut found: Vec<Transaction> = self
            .transactions
            .lock()
            .values()
            .filter(|tx| tx.invoice_id == invoice_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[derive(Debug, Clone)]
struct ReceivableLine {
    invoice_id: Option<i64>,
    payment_id: Option<i64>,
    reconciled: bool,
}

#[derive(Debug, Clone)]
struct PaymentRecord {
    payment: RegisteredPayment,
    posted_by: String,
}

#[derive(Default)]
struct LedgerState {
    invoices: HashMap<i64, Invoice>,
    partners: HashMap<i64, Partner>,
    journals: Vec<Journal>,
    payments: Vec<PaymentRecord>,
    lines: Vec<ReceivableLine>,
    next_id: i64,
    method_line_creation_disabled: bool,
}

impl LedgerState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        1000 + self.next_id
    }

    fn open_invoice_line(&mut self, invoice_id: i64) {
        self.lines.push(ReceivableLine {
            invoice_id: Some(invoice_id),
            payment_id: None,
            reconciled: false,
        });
    }
}

/// A small accounting system: enough to post invoices, take payments and
/// match receivable lines.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partner(self, id: i64, name: &str) -> Self {
        self.state.lock().partners.insert(
            id,
            Partner {
                id,
                name: name.to_string(),
                phone: None,
            },
        );
        self
    }

    pub fn with_partner_phone(self, id: i64, name: &str, phone: &str) -> Self {
        self.state.lock().partners.insert(
            id,
            Partner {
                id,
                name: name.to_string(),
                phone: Some(phone.to_string()),
            },
        );
        self
    }

    /// Adds an invoice. Posted invoices with something left to pay get an
    /// open receivable line.
    pub fn with_invoice(self, invoice: Invoice) -> Self {
        {
            let mut state = self.state.lock();
            if invoice.state == InvoiceState::Posted && invoice.amount_residual > BigDecimal::from(0)
            {
                state.open_invoice_line(invoice.id);
            }
            state.invoices.insert(invoice.id, invoice);
        }
        self
    }

    pub fn with_journal(self, journal: Journal) -> Self {
        self.state.lock().journals.push(journal);
        self
    }

    /// Makes `create_inbound_method_line` report that nothing could be created.
    pub fn without_method_line_creation(self) -> Self {
        self.state.lock().method_line_creation_disabled = true;
        self
    }

    pub fn invoice(&self, invoice_id: i64) -> Option<Invoice> {
        self.state.lock().invoices.get(&invoice_id).cloned()
    }

    pub fn payments_for(&self, invoice_id: i64) -> Vec<RegisteredPayment> {
        self.state
            .lock()
            .payments
            .iter()
            .filter(|record| record.payment.invoice_id == invoice_id)
            .map(|record| record.payment.clone())
            .collect()
    }

    /// Actor that posted each payment, in registration order.
    pub fn payment_actors(&self) -> Vec<String> {
        self.state
            .lock()
            .payments
            .iter()
            .map(|record| record.posted_by.clone())
            .collect()
    }

    /// Drops every open receivable line of an invoice, as if they had been
    /// matched elsewhere.
    pub fn clear_open_lines(&self, invoice_id: i64) {
        self.state
            .lock()
            .lines
            .retain(|line| line.invoice_id != Some(invoice_id) || line.reconciled);
    }
}

#[async_trait]
impl AccountingLedger for InMemoryLedger {
    async fn find_invoice(&self, invoice_id: i64) -> LedgerResult<Option<Invoice>> {
        Ok(self.invoice(invoice_id))
    }

    async fn find_partner(&self, partner_id: i64) -> LedgerResult<Option<Partner>> {
        Ok(self.state.lock().partners.get(&partner_id).cloned())
    }

    async fn post_invoice(
        &self,
        _credential: &ElevatedCredential,
        invoice_id: i64,
    ) -> LedgerResult<Invoice> {
        let mut state = self.state.lock();
        let invoice = state
            .invoices
            .get_mut(&invoice_id)
            .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;

        match invoice.state {
            InvoiceState::Posted => return Ok(invoice.clone()),
            InvoiceState::Cancelled => {
                return Err(LedgerError::Rejected(format!(
                    "invoice {} is cancelled",
                    invoice.name
                )))
            }
            InvoiceState::Draft => {}
        }

        invoice.state = InvoiceState::Posted;
        let posted = invoice.clone();
        if posted.amount_residual > BigDecimal::from(0) {
            state.open_invoice_line(invoice_id);
        }
        Ok(posted)
    }

    async fn journals(&self, company_id: i64) -> LedgerResult<Vec<Journal>> {
        Ok(self
            .state
            .lock()
            .journals
            .iter()
            .filter(|journal| journal.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn create_inbound_method_line(
        &self,
        _credential: &ElevatedCredential,
        journal_id: i64,
    ) -> LedgerResult<Option<PaymentMethodLine>> {
        let mut state = self.state.lock();
        if state.method_line_creation_disabled {
            return Ok(None);
        }
        let id = state.next_id();
        let journal = state
            .journals
            .iter_mut()
            .find(|journal| journal.id == journal_id)
            .ok_or(LedgerError::JournalNotFound(journal_id))?;

        let line = PaymentMethodLine {
            id,
            journal_id,
            name: format!("Manual - {}", journal.name),
            code: "manual".to_string(),
        };
        journal.inbound_method_lines.push(line.clone());
        Ok(Some(line))
    }

    async fn register_payment(
        &self,
        credential: &ElevatedCredential,
        request: &PaymentRequest,
    ) -> LedgerResult<RegisteredPayment> {
        let mut state = self.state.lock();

        if let Some(existing) = state.payments.iter().find(|record| {
            record.payment.invoice_id == request.invoice_id
                && record.payment.communication == request.communication
        }) {
            return Ok(RegisteredPayment {
                created: false,
                ..existing.payment.clone()
            });
        }

        let invoice = state
            .invoices
            .get(&request.invoice_id)
            .ok_or(LedgerError::InvoiceNotFound(request.invoice_id))?;
        if invoice.state != InvoiceState::Posted {
            return Err(LedgerError::Rejected(format!(
                "invoice {} is not posted",
                invoice.name
            )));
        }

        let id = state.next_id();
        let payment = RegisteredPayment {
            id,
            invoice_id: request.invoice_id,
            amount: request.amount.clone(),
            communication: request.communication.clone(),
            created: true,
        };
        state.payments.push(PaymentRecord {
            payment: payment.clone(),
            posted_by: credential.actor().to_string(),
        });
        state.lines.push(ReceivableLine {
            invoice_id: None,
            payment_id: Some(id),
            reconciled: false,
        });
        Ok(payment)
    }

    async fn reconcile(
        &self,
        _credential: &ElevatedCredential,
        invoice_id: i64,
        payment_id: i64,
    ) -> LedgerResult<ReconcileOutcome> {
        let mut state = self.state.lock();

        let invoice_lines = state
            .lines
            .iter()
            .filter(|line| line.invoice_id == Some(invoice_id) && !line.reconciled)
            .count();
        let payment_lines = state
            .lines
            .iter()
            .filter(|line| line.payment_id == Some(payment_id) && !line.reconciled)
            .count();
        let outcome = ReconcileOutcome {
            invoice_lines,
            payment_lines,
        };
        if !outcome.matched_anything() {
            return Ok(outcome);
        }

        let paid = state
            .payments
            .iter()
            .find(|record| record.payment.id == payment_id)
            .map(|record| record.payment.amount.clone())
            .ok_or_else(|| LedgerError::Corrupt(format!("payment {} has no record", payment_id)))?;

        let invoice = state
            .invoices
            .get_mut(&invoice_id)
            .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;
        let zero = BigDecimal::from(0);
        let residual = &invoice.amount_residual - &paid;
        invoice.amount_residual = if residual < zero { zero.clone() } else { residual };
        invoice.payment_state =
            InvoicePaymentState::from_amounts(&invoice.amount_total, &invoice.amount_residual);
        let settled = invoice.amount_residual == zero;

        for line in state.lines.iter_mut() {
            if line.payment_id == Some(payment_id) || (settled && line.invoice_id == Some(invoice_id)) {
                line.reconciled = true;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_transaction(transaction_id: &str, session_id: &str) -> NewTransaction {
        NewTransaction {
            transaction_id: transaction_id.to_string(),
            provider_session_id: session_id.to_string(),
            amount: BigDecimal::from(500),
            currency: "XOF".to_string(),
            invoice_id: 7,
            partner_id: 3,
            phone_number: "+221770000000".to_string(),
            description: None,
            reference: None,
            payment_link_url: None,
            checkout_status: None,
            payment_status: None,
            raw_provider_response: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_reused_ids_and_sessions() {
        let repo = InMemoryTransactionRepository::new();
        repo.create(new_transaction("T1", "cos-1")).await.unwrap();

        assert!(matches!(
            repo.create(new_transaction("T1", "cos-2")).await,
            Err(RepositoryError::DuplicateTransaction(id)) if id == "T1"
        ));
        assert!(matches!(
            repo.create(new_transaction("T2", "cos-1")).await,
            Err(RepositoryError::DuplicateSession(session)) if session == "cos-1"
        ));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn reclaim_takes_over_in_progress_but_not_finished_runs() {
        let repo = InMemoryTransactionRepository::new();
        repo.create(new_transaction("T1", "cos-1")).await.unwrap();

        assert!(repo.claim_reconciliation("T1").await.unwrap());
        assert!(!repo.claim_reconciliation("T1").await.unwrap());
        assert!(repo.reclaim_reconciliation("T1").await.unwrap());

        repo.finish_reconciliation(
            "T1",
            ReconciliationRecord {
                state: ReconciliationState::Settled,
                payment_reference: Some("Wave cos-1".to_string()),
                error: None,
            },
        )
        .await
        .unwrap();
        assert!(!repo.reclaim_reconciliation("T1").await.unwrap());
    }
}
