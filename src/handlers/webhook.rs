use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::status::{ReconciliationState, TransactionStatus};
use crate::error::AppError;
use crate::provider::signature::SIGNATURE_HEADER;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub success: bool,
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub status_changed: bool,
    pub reconciliation_state: ReconciliationState,
    pub payment_reference: Option<String>,
    pub warning: Option<String>,
}

/// Receives checkout events. The body is taken raw so the signature is
/// checked over the exact bytes the provider signed.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body(content = String, description = "Checkout event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Event applied", body = WebhookResponse),
        (status = 400, description = "Rejected event or reconciliation failure"),
        (status = 401, description = "Signature verification failed"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Webhooks"
)]
pub async fn checkout_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .handle_checkout_event()
        .execute(&body, signature)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Checkout event rejected");
            AppError::from(e)
        })?;

    let tx = outcome.transaction;
    Ok(Json(WebhookResponse {
        success: true,
        transaction_id: tx.transaction_id,
        status: tx.status,
        status_changed: outcome.status_changed,
        reconciliation_state: tx.reconciliation_state,
        payment_reference: tx.payment_reference,
        warning: outcome.reconciliation.and_then(|report| report.warning),
    }))
}
