use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::ledger::Invoice;
use crate::domain::status::ReconciliationState;
use crate::domain::transaction::{Transaction, TransactionView};
use crate::error::AppError;
use crate::services::reconciliation::{ReconciliationError, ReconciliationReport};
use crate::use_cases::{InitiateError, InitiatePaymentInput, InvoicePaymentOverrides, PaymentStats};
use crate::validation::{require, sanitize_string, ValidationError, DEFAULT_CURRENCY};
use crate::AppState;

/// Body of `POST /api/payment/initiate`. Older clients send `facture_id` and
/// `phoneNumber`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    pub transaction_id: Option<String>,
    #[serde(alias = "facture_id")]
    pub invoice_id: Option<i64>,
    pub partner_id: Option<i64>,
    #[serde(alias = "phoneNumber")]
    pub phone_number: Option<String>,
    #[schema(value_type = Option<String>, example = "1000")]
    pub amount: Option<BigDecimal>,
    /// Defaults to XOF.
    pub currency: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub success_url: Option<String>,
}

impl InitiatePaymentRequest {
    pub fn into_input(self) -> Result<InitiatePaymentInput, ValidationError> {
        let clean = |value: Option<String>| {
            value
                .map(|v| sanitize_string(&v))
                .filter(|v| !v.is_empty())
        };

        Ok(InitiatePaymentInput {
            transaction_id: require("transaction_id", clean(self.transaction_id))?,
            invoice_id: require("invoice_id", self.invoice_id)?,
            partner_id: require("partner_id", self.partner_id)?,
            phone_number: require("phone_number", clean(self.phone_number))?,
            amount: require("amount", self.amount)?,
            currency: clean(self.currency)
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            description: clean(self.description),
            reference: clean(self.reference),
            success_url: clean(self.success_url),
        })
    }
}

/// Body of `POST /api/payment/invoice/{invoice_id}/initiate`. All fields
/// are optional; the invoice supplies amount, currency and payer.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InvoiceInitiateRequest {
    pub transaction_id: Option<String>,
    #[serde(alias = "phoneNumber")]
    pub phone_number: Option<String>,
    pub success_url: Option<String>,
}

impl InvoiceInitiateRequest {
    fn into_overrides(self) -> InvoicePaymentOverrides {
        let clean = |value: Option<String>| {
            value
                .map(|v| sanitize_string(&v))
                .filter(|v| !v.is_empty())
        };
        InvoicePaymentOverrides {
            transaction_id: clean(self.transaction_id),
            phone_number: clean(self.phone_number),
            success_url: clean(self.success_url),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceInitiateResponse {
    pub success: bool,
    pub existing: bool,
    pub invoice: Invoice,
    #[serde(flatten)]
    pub transaction: TransactionView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InitiatePaymentResponse {
    pub success: bool,
    /// True when the transaction id was already initiated.
    pub existing: bool,
    #[serde(flatten)]
    pub transaction: TransactionView,
}

/// Reconciliation result attached to status responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReconciliationView {
    pub success: bool,
    pub state: ReconciliationState,
    pub payment_reference: Option<String>,
    pub warning: Option<String>,
    pub error: Option<String>,
    pub kind: Option<String>,
}

impl ReconciliationView {
    pub fn from_result(
        result: &Result<ReconciliationReport, ReconciliationError>,
        tx: &Transaction,
    ) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                state: report.state,
                payment_reference: report.payment_reference.clone(),
                warning: report.warning.clone(),
                error: None,
                kind: None,
            },
            Err(e) => Self {
                success: false,
                state: tx.reconciliation_state,
                payment_reference: None,
                warning: None,
                error: Some(e.to_string()),
                kind: Some(e.kind().to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub success: bool,
    /// False when the provider could not be reached and the stored state
    /// is returned.
    pub refreshed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Invoice>,
    #[serde(flatten)]
    pub transaction: TransactionView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoicePaymentsResponse {
    pub success: bool,
    pub invoice: Invoice,
    pub transactions: Vec<TransactionView>,
    pub stats: PaymentStats,
}

#[utoipa::path(
    post,
    path = "/api/payment/initiate",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Checkout session created or replayed", body = InitiatePaymentResponse),
        (status = 400, description = "Invalid request, missing configuration or provider rejection")
    ),
    tag = "Payments"
)]
pub async fn initiate(
    State(state): State<AppState>,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<InitiatePaymentResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let input = request.into_input()?;

    let output = state.initiate_payment().execute(input).await?;

    Ok(Json(InitiatePaymentResponse {
        success: true,
        existing: output.existing,
        transaction: TransactionView::from(&output.transaction),
    }))
}

#[utoipa::path(
    get,
    path = "/api/payment/status/{transaction_id}",
    params(("transaction_id" = String, Path, description = "Caller transaction id")),
    responses(
        (status = 200, description = "Current transaction state", body = StatusResponse),
        (status = 400, description = "Transaction not found")
    ),
    tag = "Payments"
)]
pub async fn status(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let output = state.refresh_status().execute(&transaction_id).await?;

    Ok(Json(StatusResponse {
        success: true,
        refreshed: output.refreshed,
        reconciliation: output
            .reconciliation
            .as_ref()
            .map(|result| ReconciliationView::from_result(result, &output.transaction)),
        invoice: output.invoice,
        transaction: TransactionView::from(&output.transaction),
    }))
}

#[utoipa::path(
    post,
    path = "/api/payment/invoice/{invoice_id}/initiate",
    params(("invoice_id" = i64, Path, description = "Invoice id")),
    request_body = InvoiceInitiateRequest,
    responses(
        (status = 200, description = "Checkout session opened for the invoice's open amount", body = InvoiceInitiateResponse),
        (status = 400, description = "Invoice cannot be charged, payer has no phone, or provider rejection"),
        (status = 404, description = "Invoice not found")
    ),
    tag = "Payments"
)]
pub async fn initiate_for_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<i64>,
    body: Bytes,
) -> Result<Json<InvoiceInitiateResponse>, AppError> {
    let request: InvoiceInitiateRequest = if body.is_empty() {
        InvoiceInitiateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::Validation(e.to_string()))?
    };
    let overrides = request.into_overrides();

    let output = state
        .initiate_invoice_payment()
        .execute(invoice_id, overrides)
        .await
        .map_err(|e| match e {
            e @ InitiateError::InvoiceNotFound(_) => AppError::NotFound(e.to_string()),
            e => e.into(),
        })?;

    Ok(Json(InvoiceInitiateResponse {
        success: true,
        existing: output.payment.existing,
        invoice: output.invoice,
        transaction: TransactionView::from(&output.payment.transaction),
    }))
}

#[utoipa::path(
    get,
    path = "/api/payment/invoice/{invoice_id}",
    params(("invoice_id" = i64, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Checkout attempts for the invoice", body = InvoicePaymentsResponse),
        (status = 404, description = "Invoice not found")
    ),
    tag = "Payments"
)]
pub async fn invoice_payments(
    State(state): State<AppState>,
    Path(invoice_id): Path<i64>,
) -> Result<Json<InvoicePaymentsResponse>, AppError> {
    let output = state.invoice_payments().execute(invoice_id).await?;

    Ok(Json(InvoicePaymentsResponse {
        success: true,
        transactions: output.transactions.iter().map(TransactionView::from).collect(),
        invoice: output.invoice,
        stats: output.stats,
    }))
}
