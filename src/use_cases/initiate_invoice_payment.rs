//! Initiate invoice payment use case.
//! Builds a checkout for whatever is still open on an invoice, taking the
//! payer from the invoice's partner.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::ledger::{Invoice, InvoiceState};
use crate::ports::AccountingLedger;
use crate::use_cases::initiate_payment::{
    InitiateError, InitiatePayment, InitiatePaymentInput, InitiatePaymentOutput,
};
use crate::validation::ValidationError;

/// Optional overrides; everything else comes from the invoice.
#[derive(Debug, Clone, Default)]
pub struct InvoicePaymentOverrides {
    pub transaction_id: Option<String>,
    pub phone_number: Option<String>,
    pub success_url: Option<String>,
}

#[derive(Debug)]
pub struct InitiateInvoicePaymentOutput {
    pub invoice: Invoice,
    pub payment: InitiatePaymentOutput,
}

pub struct InitiateInvoicePayment {
    ledger: Arc<dyn AccountingLedger>,
    initiate: InitiatePayment,
}

impl InitiateInvoicePayment {
    pub fn new(ledger: Arc<dyn AccountingLedger>, initiate: InitiatePayment) -> Self {
        Self { ledger, initiate }
    }

    pub async fn execute(
        &self,
        invoice_id: i64,
        overrides: InvoicePaymentOverrides,
    ) -> Result<InitiateInvoicePaymentOutput, InitiateError> {
        let input = self.build_input(invoice_id, overrides, Utc::now()).await?;
        let payment = self.initiate.execute(input).await?;

        // Re-read so the caller sees the invoice as it stands after initiation.
        let invoice = self
            .ledger
            .find_invoice(invoice_id)
            .await?
            .ok_or(InitiateError::InvoiceNotFound(invoice_id))?;

        Ok(InitiateInvoicePaymentOutput { invoice, payment })
    }

    async fn build_input(
        &self,
        invoice_id: i64,
        overrides: InvoicePaymentOverrides,
        now: DateTime<Utc>,
    ) -> Result<InitiatePaymentInput, InitiateError> {
        let invoice = self
            .ledger
            .find_invoice(invoice_id)
            .await?
            .ok_or(InitiateError::InvoiceNotFound(invoice_id))?;
        let partner = self
            .ledger
            .find_partner(invoice.partner_id)
            .await?
            .ok_or(InitiateError::PartnerNotFound(invoice.partner_id))?;

        if invoice.state == InvoiceState::Cancelled {
            return Err(ValidationError::new("invoice_id", "invoice is cancelled").into());
        }
        if invoice.amount_residual <= BigDecimal::from(0) {
            return Err(ValidationError::new("amount", "invoice has nothing left to pay").into());
        }

        let phone_number = overrides
            .phone_number
            .or(partner.phone)
            .ok_or_else(|| {
                ValidationError::new("phone_number", "partner has no phone number on file")
            })?;

        Ok(InitiatePaymentInput {
            transaction_id: overrides
                .transaction_id
                .unwrap_or_else(|| invoice_transaction_id(invoice.id, now)),
            invoice_id: invoice.id,
            partner_id: partner.id,
            phone_number,
            amount: invoice.amount_residual.clone(),
            currency: invoice.currency.clone(),
            description: Some(format!("Payment for invoice {}", invoice.name)),
            reference: Some(invoice.name),
            success_url: overrides.success_url,
        })
    }
}

/// `TXN-{invoice}-{YYYYmmddHHMMSS}`
pub fn invoice_transaction_id(invoice_id: i64, now: DateTime<Utc>) -> String {
    format!("TXN-{}-{}", invoice_id, now.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryLedger, InMemoryTransactionRepository};
    use crate::adapters::static_credentials::StaticCredentialSource;
    use crate::domain::ledger::InvoicePaymentState;
    use crate::provider::{CheckoutClient, ProviderCredentials};
    use chrono::TimeZone;

    fn invoice(id: i64, state: InvoiceState, residual: i64) -> Invoice {
        Invoice {
            id,
            name: format!("INV/2025/{:04}", id),
            company_id: 1,
            partner_id: 3,
            state,
            currency: "XOF".to_string(),
            amount_total: BigDecimal::from(1000),
            amount_residual: BigDecimal::from(residual),
            payment_state: InvoicePaymentState::from_amounts(
                &BigDecimal::from(1000),
                &BigDecimal::from(residual),
            ),
        }
    }

    fn use_case(ledger: InMemoryLedger, server_url: String) -> InitiateInvoicePayment {
        let ledger: Arc<dyn AccountingLedger> = Arc::new(ledger);
        let initiate = InitiatePayment::new(
            Arc::new(InMemoryTransactionRepository::new()),
            ledger.clone(),
            Arc::new(StaticCredentialSource::new(Some(ProviderCredentials::new(
                "wave_test_key",
                "https://shop.example/error",
            )))),
            CheckoutClient::new(server_url),
        );
        InitiateInvoicePayment::new(ledger, initiate)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 1, 12, 34, 56).unwrap()
    }

    #[test]
    fn transaction_ids_carry_invoice_and_time() {
        assert_eq!(invoice_transaction_id(7, now()), "TXN-7-20251101123456");
    }

    #[tokio::test]
    async fn charges_the_open_amount_to_the_partner_phone() {
        let ledger = InMemoryLedger::new()
            .with_partner_phone(3, "Awa Diop", "+221770000000")
            .with_invoice(invoice(7, InvoiceState::Posted, 600));
        let uc = use_case(ledger, "http://127.0.0.1:9".to_string());

        let input = uc
            .build_input(7, InvoicePaymentOverrides::default(), now())
            .await
            .unwrap();
        assert_eq!(input.transaction_id, "TXN-7-20251101123456");
        assert_eq!(input.partner_id, 3);
        assert_eq!(input.phone_number, "+221770000000");
        assert_eq!(input.amount, BigDecimal::from(600));
        assert_eq!(input.currency, "XOF");
        assert_eq!(input.reference.as_deref(), Some("INV/2025/0007"));
        assert_eq!(
            input.description.as_deref(),
            Some("Payment for invoice INV/2025/0007")
        );
    }

    #[tokio::test]
    async fn overrides_win_over_invoice_defaults() {
        let ledger = InMemoryLedger::new()
            .with_partner_phone(3, "Awa Diop", "+221770000000")
            .with_invoice(invoice(7, InvoiceState::Posted, 1000));
        let uc = use_case(ledger, "http://127.0.0.1:9".to_string());

        let input = uc
            .build_input(
                7,
                InvoicePaymentOverrides {
                    transaction_id: Some("ORDER-12".to_string()),
                    phone_number: Some("+221781111111".to_string()),
                    success_url: Some("https://shop.example/done".to_string()),
                },
                now(),
            )
            .await
            .unwrap();
        assert_eq!(input.transaction_id, "ORDER-12");
        assert_eq!(input.phone_number, "+221781111111");
        assert_eq!(input.success_url.as_deref(), Some("https://shop.example/done"));
    }

    #[tokio::test]
    async fn refuses_invoices_that_cannot_be_charged() {
        let ledger = InMemoryLedger::new()
            .with_partner(3, "Awa Diop")
            .with_invoice(invoice(7, InvoiceState::Posted, 1000))
            .with_invoice(invoice(8, InvoiceState::Posted, 0))
            .with_invoice(invoice(9, InvoiceState::Cancelled, 1000));
        let uc = use_case(ledger, "http://127.0.0.1:9".to_string());

        let no_phone = uc
            .build_input(7, InvoicePaymentOverrides::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(no_phone, InitiateError::Validation(e) if e.field == "phone_number"));

        let paid = uc
            .build_input(8, InvoicePaymentOverrides::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(paid, InitiateError::Validation(e) if e.field == "amount"));

        let cancelled = uc
            .build_input(9, InvoicePaymentOverrides::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(cancelled, InitiateError::Validation(e) if e.field == "invoice_id"));

        assert!(matches!(
            uc.build_input(99, InvoicePaymentOverrides::default(), now())
                .await
                .unwrap_err(),
            InitiateError::InvoiceNotFound(99)
        ));
    }

    #[tokio::test]
    async fn opens_a_checkout_for_the_invoice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/checkout/sessions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "amount": "600",
                "currency": "XOF",
            })))
            .with_status(200)
            .with_body(
                r#"{"id":"cos-9","wave_launch_url":"https://pay.wave.com/c/cos-9","checkout_status":"open","payment_status":"processing"}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let ledger = InMemoryLedger::new()
            .with_partner_phone(3, "Awa Diop", "+221770000000")
            .with_invoice(invoice(7, InvoiceState::Posted, 600));
        let uc = use_case(ledger, server.url());

        let out = uc
            .execute(7, InvoicePaymentOverrides::default())
            .await
            .unwrap();
        assert!(!out.payment.existing);
        assert!(out.payment.transaction.transaction_id.starts_with("TXN-7-"));
        assert_eq!(out.payment.transaction.reference.as_deref(), Some("INV/2025/0007"));
        assert_eq!(out.invoice.id, 7);
        mock.assert_async().await;
    }
}
