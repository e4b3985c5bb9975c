//! Handle checkout event use case.
//! Verifies and applies a provider webhook delivery.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::transaction::{ObservationSource, Transaction};
use crate::ports::{CredentialSource, RepositoryError, TransactionRepository};
use crate::provider::signature::{self, SignatureError};
use crate::provider::CheckoutSession;
use crate::services::reconciliation::{ReconciliationError, ReconciliationReport};
use crate::services::status_sync::{observe, StatusSync};
use crate::utils::sanitize::sanitize_json;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Event envelope. Older deliveries name the type `event`.
#[derive(Debug, Deserialize)]
struct CheckoutEvent {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl CheckoutEvent {
    fn event_type(&self) -> Option<&str> {
        self.kind.as_deref().or(self.event.as_deref())
    }

    fn session_id(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get("id"))
            .and_then(|id| id.as_str())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug)]
pub struct CheckoutEventOutcome {
    pub transaction: Transaction,
    pub status_changed: bool,
    pub reconciliation: Option<ReconciliationReport>,
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid JSON payload: {0}")]
    MalformedPayload(String),
    #[error("No active payment provider configuration")]
    ConfigurationMissing,
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("Unhandled event type: {0}")]
    UnhandledEvent(String),
    #[error("Missing session id in event data")]
    MissingSessionId,
    #[error("Transaction not found")]
    TransactionNotFound(String),
    #[error(transparent)]
    Reconciliation(ReconciliationError),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

pub struct HandleCheckoutEvent {
    transactions: Arc<dyn TransactionRepository>,
    credentials: Arc<dyn CredentialSource>,
    sync: Arc<StatusSync>,
}

impl HandleCheckoutEvent {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        credentials: Arc<dyn CredentialSource>,
        sync: Arc<StatusSync>,
    ) -> Self {
        Self {
            transactions,
            credentials,
            sync,
        }
    }

    /// `body` is the raw request body, as signed by the provider.
    pub async fn execute(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<CheckoutEventOutcome, WebhookError> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        tracing::info!(payload = %sanitize_json(&payload), "Checkout event received");

        let credentials = self
            .credentials
            .active()
            .await?
            .ok_or(WebhookError::ConfigurationMissing)?;
        if let Some(secret) = &credentials.webhook_secret {
            signature::verify_signature(secret, body, signature_header, Utc::now().timestamp())?;
        }

        let event: CheckoutEvent = serde_json::from_value(payload.clone())
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let event_type = event.event_type().unwrap_or_default();
        if event_type != CHECKOUT_COMPLETED {
            return Err(WebhookError::UnhandledEvent(event_type.to_string()));
        }
        let session_id = event.session_id().ok_or(WebhookError::MissingSessionId)?;

        let tx = self
            .transactions
            .find_by_provider_session_id(session_id)
            .await?
            .ok_or_else(|| WebhookError::TransactionNotFound(session_id.to_string()))?;

        let data = event.data.clone().unwrap_or_default();
        let session = CheckoutSession::from_value(data)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let mut observation = observe(&session, ObservationSource::Webhook);
        observation.raw_payload = payload;

        let outcome = self.sync.apply(&tx.transaction_id, observation).await?;
        match outcome.reconciliation {
            Some(Err(e)) => Err(WebhookError::Reconciliation(e)),
            reconciliation => Ok(CheckoutEventOutcome {
                transaction: outcome.transaction,
                status_changed: outcome.status_changed,
                reconciliation: reconciliation.and_then(Result::ok),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_falls_back_to_event_field() {
        let event: CheckoutEvent =
            serde_json::from_str(r#"{"event":"checkout.session.completed","data":{"id":"cos-1"}}"#)
                .unwrap();
        assert_eq!(event.event_type(), Some(CHECKOUT_COMPLETED));
        assert_eq!(event.session_id(), Some("cos-1"));

        let event: CheckoutEvent =
            serde_json::from_str(r#"{"type":"checkout.session.completed","event":"other"}"#)
                .unwrap();
        assert_eq!(event.event_type(), Some(CHECKOUT_COMPLETED));
        assert_eq!(event.session_id(), None);
    }

    #[test]
    fn empty_session_id_is_missing() {
        let event: CheckoutEvent =
            serde_json::from_str(r#"{"type":"checkout.session.completed","data":{"id":""}}"#)
                .unwrap();
        assert_eq!(event.session_id(), None);
    }
}
