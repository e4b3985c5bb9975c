//! Initiate payment use case.
//! Opens a provider checkout session for an invoice and records it.

use bigdecimal::BigDecimal;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::transaction::{NewTransaction, Transaction};
use crate::ports::{
    AccountingLedger, CredentialSource, LedgerError, RepositoryError, TransactionRepository,
};
use crate::provider::{CheckoutClient, CheckoutRequest, ProviderError};
use crate::validation::{self, ValidationError};

/// Input for the InitiatePayment use case. Built from an already parsed
/// request; [`InitiatePayment::execute`] validates it.
#[derive(Debug, Clone)]
pub struct InitiatePaymentInput {
    pub transaction_id: String,
    pub invoice_id: i64,
    pub partner_id: i64,
    pub phone_number: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    /// Overrides the configured success URL template.
    pub success_url: Option<String>,
}

#[derive(Debug)]
pub struct InitiatePaymentOutput {
    pub transaction: Transaction,
    /// True when the transaction id was already known and nothing was sent
    /// to the provider.
    pub existing: bool,
}

#[derive(Debug, Error)]
pub enum InitiateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("No active payment provider configuration")]
    ConfigurationMissing,
    #[error("Invoice {0} not found")]
    InvoiceNotFound(i64),
    #[error("Partner {0} not found")]
    PartnerNotFound(i64),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] RepositoryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct InitiatePayment {
    transactions: Arc<dyn TransactionRepository>,
    ledger: Arc<dyn AccountingLedger>,
    credentials: Arc<dyn CredentialSource>,
    client: CheckoutClient,
}

impl InitiatePayment {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<dyn AccountingLedger>,
        credentials: Arc<dyn CredentialSource>,
        client: CheckoutClient,
    ) -> Self {
        Self {
            transactions,
            ledger,
            credentials,
            client,
        }
    }

    pub async fn execute(
        &self,
        input: InitiatePaymentInput,
    ) -> Result<InitiatePaymentOutput, InitiateError> {
        validate(&input)?;

        if let Some(existing) = self
            .transactions
            .find_by_transaction_id(&input.transaction_id)
            .await?
        {
            tracing::info!(
                transaction_id = %input.transaction_id,
                "Transaction already initiated, returning stored session"
            );
            return Ok(InitiatePaymentOutput {
                transaction: existing,
                existing: true,
            });
        }

        let credentials = self
            .credentials
            .active()
            .await?
            .ok_or(InitiateError::ConfigurationMissing)?;

        self.ledger
            .find_invoice(input.invoice_id)
            .await?
            .ok_or(InitiateError::InvoiceNotFound(input.invoice_id))?;
        self.ledger
            .find_partner(input.partner_id)
            .await?
            .ok_or(InitiateError::PartnerNotFound(input.partner_id))?;

        let request = CheckoutRequest {
            amount: input.amount.clone(),
            currency: input.currency.clone(),
            success_url: input
                .success_url
                .clone()
                .unwrap_or_else(|| credentials.success_url_for(&input.transaction_id)),
            error_url: credentials.error_url.clone(),
            client_reference: Some(input.transaction_id.clone()),
        };
        let session = match self
            .client
            .create_checkout_session(&request, &credentials)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    transaction_id = %input.transaction_id,
                    invoice_id = input.invoice_id,
                    error = %e,
                    "Checkout session creation failed"
                );
                return Err(e.into());
            }
        };

        let new_tx = NewTransaction {
            transaction_id: input.transaction_id.clone(),
            provider_session_id: session.id.clone(),
            amount: input.amount,
            currency: input.currency,
            invoice_id: input.invoice_id,
            partner_id: input.partner_id,
            phone_number: input.phone_number,
            description: input.description,
            reference: input.reference,
            payment_link_url: session.checkout_url.clone(),
            checkout_status: session.checkout_status.clone(),
            payment_status: session.payment_status.clone(),
            raw_provider_response: Some(session.raw.clone()),
        };

        match self.transactions.create(new_tx).await {
            Ok(transaction) => {
                tracing::info!(
                    transaction_id = %transaction.transaction_id,
                    session_id = %session.id,
                    invoice_id = transaction.invoice_id,
                    "Checkout session created"
                );
                Ok(InitiatePaymentOutput {
                    transaction,
                    existing: false,
                })
            }
            Err(RepositoryError::DuplicateTransaction(id)) => {
                // A concurrent request with the same id won the insert.
                tracing::warn!(
                    transaction_id = %id,
                    orphan_session_id = %session.id,
                    "Lost initiation race, replaying stored transaction"
                );
                let winner = self
                    .transactions
                    .find_by_transaction_id(&id)
                    .await?
                    .ok_or(RepositoryError::NotFound(id))?;
                Ok(InitiatePaymentOutput {
                    transaction: winner,
                    existing: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate(input: &InitiatePaymentInput) -> Result<(), ValidationError> {
    validation::validate_transaction_id(&input.transaction_id)?;
    validation::validate_positive_id("invoice_id", input.invoice_id)?;
    validation::validate_positive_id("partner_id", input.partner_id)?;
    validation::validate_phone_number(&input.phone_number)?;
    validation::validate_positive_amount(&input.amount)?;
    validation::validate_currency(&input.currency)?;
    if let Some(description) = &input.description {
        validation::validate_max_len("description", description, validation::DESCRIPTION_MAX_LEN)?;
    }
    if let Some(reference) = &input.reference {
        validation::validate_max_len("reference", reference, validation::REFERENCE_MAX_LEN)?;
    }
    if let Some(success_url) = &input.success_url {
        validation::validate_http_url("success_url", success_url)?;
    }
    Ok(())
}
