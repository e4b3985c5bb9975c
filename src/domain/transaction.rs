//! Transaction domain entity.
//! Framework-agnostic representation of one checkout attempt.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::status::{ReconciliationState, TransactionStatus};
use crate::utils::timestamp;

/// Domain entity representing a payment attempt against one invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    /// Caller-supplied idempotency key.
    pub transaction_id: String,
    pub provider_session_id: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub checkout_status: Option<String>,
    pub payment_status: Option<String>,
    pub invoice_id: i64,
    pub partner_id: i64,
    pub phone_number: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub payment_link_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<NaiveDateTime>,
    pub raw_provider_response: Option<serde_json::Value>,
    pub webhook_payload: Option<serde_json::Value>,
    pub reconciliation_state: ReconciliationState,
    pub reconciliation_error: Option<String>,
    pub payment_reference: Option<String>,
}

/// Fields known once the provider has accepted a checkout session.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub transaction_id: String,
    pub provider_session_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub invoice_id: i64,
    pub partner_id: i64,
    pub phone_number: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub payment_link_url: Option<String>,
    pub checkout_status: Option<String>,
    pub payment_status: Option<String>,
    pub raw_provider_response: Option<serde_json::Value>,
}

impl Transaction {
    pub fn new(input: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_id: input.transaction_id,
            provider_session_id: Some(input.provider_session_id),
            amount: input.amount,
            currency: input.currency,
            status: TransactionStatus::Pending,
            checkout_status: input.checkout_status,
            payment_status: input.payment_status,
            invoice_id: input.invoice_id,
            partner_id: input.partner_id,
            phone_number: input.phone_number,
            description: input.description,
            reference: input.reference,
            payment_link_url: input.payment_link_url,
            created_at: now,
            updated_at: now,
            completed_at: None,
            raw_provider_response: input.raw_provider_response,
            webhook_payload: None,
            reconciliation_state: ReconciliationState::NotStarted,
            reconciliation_error: None,
            payment_reference: None,
        }
    }

    /// Completed and the payment side has not finished yet.
    pub fn needs_reconciliation(&self) -> bool {
        self.status == TransactionStatus::Completed && !self.reconciliation_state.is_done()
    }

    /// Applies an observation in place. Raw provider fields are refreshed
    /// every time; the status only leaves `pending`.
    pub fn apply(
        &mut self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Option<StatusTransition> {
        if observation.checkout_status.is_some() {
            self.checkout_status = observation.checkout_status.clone();
        }
        if observation.payment_status.is_some() {
            self.payment_status = observation.payment_status.clone();
        }
        match observation.source {
            ObservationSource::Poll => {
                self.raw_provider_response = Some(observation.raw_payload.clone())
            }
            ObservationSource::Webhook => {
                self.webhook_payload = Some(observation.raw_payload.clone())
            }
        }

        if !self.status.can_transition_to(observation.status) {
            if self.status != observation.status {
                tracing::warn!(
                    transaction_id = %self.transaction_id,
                    current = %self.status,
                    observed = %observation.status,
                    "Ignoring status change out of a terminal state"
                );
            }
            return None;
        }

        let transition = StatusTransition {
            from: self.status,
            to: observation.status,
        };
        self.status = observation.status;
        self.updated_at = now;
        if observation.status == TransactionStatus::Completed && self.completed_at.is_none() {
            self.completed_at = observation.completed_at;
        }
        Some(transition)
    }
}

/// Where a provider observation came from. Decides which raw payload
/// column is overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationSource {
    Poll,
    Webhook,
}

/// A provider status snapshot, already mapped to the internal lifecycle.
#[derive(Debug, Clone)]
pub struct Observation {
    pub status: TransactionStatus,
    pub checkout_status: Option<String>,
    pub payment_status: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub raw_payload: serde_json::Value,
    pub source: ObservationSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

/// Result of applying an [`Observation`] to the store.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub transaction: Transaction,
    pub transition: Option<StatusTransition>,
}

impl StatusUpdate {
    pub fn newly_completed(&self) -> bool {
        matches!(
            self.transition,
            Some(StatusTransition {
                to: TransactionStatus::Completed,
                ..
            })
        )
    }
}

/// Public projection returned by the payment endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionView {
    pub transaction_id: String,
    pub session_id: Option<String>,
    pub payment_url: Option<String>,
    pub status: TransactionStatus,
    pub checkout_status: Option<String>,
    pub payment_status: Option<String>,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub currency: String,
    pub phone: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub invoice_id: i64,
    pub partner_id: i64,
    pub reconciliation_state: ReconciliationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(serialize_with = "timestamp::serialize_local_opt")]
    #[schema(value_type = Option<String>, example = "2025-11-01 12:34:56")]
    pub completed_at: Option<NaiveDateTime>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.transaction_id.clone(),
            session_id: tx.provider_session_id.clone(),
            payment_url: tx.payment_link_url.clone(),
            status: tx.status,
            checkout_status: tx.checkout_status.clone(),
            payment_status: tx.payment_status.clone(),
            amount: tx.amount.clone(),
            currency: tx.currency.clone(),
            phone: tx.phone_number.clone(),
            description: tx.description.clone(),
            reference: tx.reference.clone(),
            invoice_id: tx.invoice_id,
            partner_id: tx.partner_id,
            reconciliation_state: tx.reconciliation_state,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
            completed_at: tx.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewTransaction {
        NewTransaction {
            transaction_id: "T1".to_string(),
            provider_session_id: "S1".to_string(),
            amount: BigDecimal::from(1000),
            currency: "XOF".to_string(),
            invoice_id: 5,
            partner_id: 9,
            phone_number: "+221770000000".to_string(),
            description: None,
            reference: None,
            payment_link_url: Some("https://pay/S1".to_string()),
            checkout_status: Some("open".to_string()),
            payment_status: Some("processing".to_string()),
            raw_provider_response: None,
        }
    }

    #[test]
    fn new_transaction_starts_pending_and_unreconciled() {
        let tx = Transaction::new(sample());
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.reconciliation_state, ReconciliationState::NotStarted);
        assert_eq!(tx.provider_session_id.as_deref(), Some("S1"));
        assert!(tx.completed_at.is_none());
        assert!(!tx.needs_reconciliation());
    }

    fn observation(status: TransactionStatus, completed_at: Option<&str>) -> Observation {
        Observation {
            status,
            checkout_status: Some("complete".to_string()),
            payment_status: Some("succeeded".to_string()),
            completed_at: timestamp::parse_provider_timestamp(completed_at),
            raw_payload: serde_json::json!({"id": "S1"}),
            source: ObservationSource::Webhook,
        }
    }

    #[test]
    fn apply_moves_pending_to_completed_once() {
        let mut tx = Transaction::new(sample());
        let first = tx.apply(
            &observation(TransactionStatus::Completed, Some("2025-11-01T12:34:56Z")),
            Utc::now(),
        );
        assert_eq!(
            first,
            Some(StatusTransition {
                from: TransactionStatus::Pending,
                to: TransactionStatus::Completed
            })
        );
        let completed_at = tx.completed_at;
        assert!(completed_at.is_some());
        assert!(tx.webhook_payload.is_some());

        let again = tx.apply(
            &observation(TransactionStatus::Completed, Some("2030-01-01T00:00:00Z")),
            Utc::now(),
        );
        assert!(again.is_none());
        assert_eq!(tx.completed_at, completed_at);
    }

    #[test]
    fn apply_never_regresses_a_terminal_status() {
        let mut tx = Transaction::new(sample());
        tx.apply(&observation(TransactionStatus::Expired, None), Utc::now());
        assert_eq!(tx.status, TransactionStatus::Expired);

        assert!(tx
            .apply(&observation(TransactionStatus::Pending, None), Utc::now())
            .is_none());
        assert!(tx
            .apply(&observation(TransactionStatus::Completed, None), Utc::now())
            .is_none());
        assert_eq!(tx.status, TransactionStatus::Expired);
        // raw fields are still refreshed
        assert_eq!(tx.checkout_status.as_deref(), Some("complete"));
    }

    #[test]
    fn view_renders_completed_at_in_local_format() {
        let mut tx = Transaction::new(sample());
        tx.completed_at = timestamp::parse_provider_timestamp(Some("2025-11-01T12:34:56Z"));
        let json = serde_json::to_value(TransactionView::from(&tx)).unwrap();
        assert_eq!(json["completed_at"], "2025-11-01 12:34:56");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["session_id"], "S1");
        assert_eq!(json["amount"], "1000");
    }
}
