pub mod payments;
pub mod webhook;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    /// `connected`, `disconnected`, or `not_configured` for in-memory runs.
    pub db: String,
    pub provider_circuit: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthStatus),
        (status = 503, description = "Service is unhealthy", body = HealthStatus)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match &state.db {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => "connected",
            Err(e) => {
                tracing::warn!(error = %e, "Health check could not reach the database");
                "disconnected"
            }
        },
        None => "not_configured",
    };
    let healthy = db_status != "disconnected";

    let health_response = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        db: db_status.to_string(),
        provider_circuit: state.checkout_client.circuit_state(),
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        payments::initiate,
        payments::status,
        payments::invoice_payments,
        payments::initiate_for_invoice,
        webhook::checkout_event
    ),
    components(
        schemas(
            HealthStatus,
            payments::InitiatePaymentRequest,
            payments::InitiatePaymentResponse,
            payments::StatusResponse,
            payments::ReconciliationView,
            payments::InvoicePaymentsResponse,
            payments::InvoiceInitiateRequest,
            payments::InvoiceInitiateResponse,
            webhook::WebhookResponse,
            crate::domain::transaction::TransactionView,
            crate::domain::status::TransactionStatus,
            crate::domain::status::ReconciliationState,
            crate::domain::ledger::Invoice,
            crate::domain::ledger::InvoiceState,
            crate::domain::ledger::InvoicePaymentState,
            crate::use_cases::invoice_payments::PaymentStats,
            crate::use_cases::invoice_payments::PaymentCoverage
        )
    ),
    tags(
        (name = "Payments", description = "Checkout initiation and status"),
        (name = "Webhooks", description = "Provider checkout events"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
