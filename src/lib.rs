pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod provider;
pub mod services;
pub mod use_cases;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::adapters::{
    PostgresCredentialSource, PostgresLedger, PostgresTransactionRepository,
    StaticCredentialSource,
};
use crate::config::Config;
use crate::domain::ledger::ElevatedCredential;
use crate::ports::{AccountingLedger, CredentialSource, TransactionRepository};
use crate::provider::CheckoutClient;
use crate::services::{ReconciliationEngine, StatusSync};
use crate::use_cases::{
    HandleCheckoutEvent, InitiateInvoicePayment, InitiatePayment, InvoicePayments, RefreshStatus,
};

#[derive(Clone)]
pub struct AppState {
    /// Present when running against Postgres; used by the health check.
    pub db: Option<sqlx::PgPool>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub ledger: Arc<dyn AccountingLedger>,
    pub credentials: Arc<dyn CredentialSource>,
    pub checkout_client: CheckoutClient,
    pub sync: Arc<StatusSync>,
}

impl AppState {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<dyn AccountingLedger>,
        credentials: Arc<dyn CredentialSource>,
        checkout_client: CheckoutClient,
        engine: ReconciliationEngine,
    ) -> Self {
        let sync = Arc::new(StatusSync::new(transactions.clone(), Arc::new(engine)));
        Self {
            db: None,
            transactions,
            ledger,
            credentials,
            checkout_client,
            sync,
        }
    }

    /// Wires the Postgres adapters. Credentials come from the environment
    /// when `PROVIDER_API_KEY` is set, otherwise from `provider_configs`.
    pub fn from_pool(pool: sqlx::PgPool, config: &Config) -> Self {
        let transactions: Arc<dyn TransactionRepository> =
            Arc::new(PostgresTransactionRepository::new(pool.clone()));
        let ledger: Arc<dyn AccountingLedger> = Arc::new(PostgresLedger::new(pool.clone()));
        let credentials: Arc<dyn CredentialSource> = match StaticCredentialSource::from_config(config)
        {
            Some(source) => {
                tracing::info!("Using provider credentials from the environment");
                Arc::new(source)
            }
            None => Arc::new(PostgresCredentialSource::new(pool.clone())),
        };
        let engine = ReconciliationEngine::new(
            ledger.clone(),
            transactions.clone(),
            ElevatedCredential::new(config.ledger_actor.clone()),
        )
        .with_journal_code(config.payment_journal_code.clone())
        .with_provider_label(config.provider_label.clone());

        let mut state = Self::new(
            transactions,
            ledger,
            credentials,
            CheckoutClient::new(config.provider_api_url.clone()),
            engine,
        );
        state.db = Some(pool);
        state
    }

    pub fn initiate_payment(&self) -> InitiatePayment {
        InitiatePayment::new(
            self.transactions.clone(),
            self.ledger.clone(),
            self.credentials.clone(),
            self.checkout_client.clone(),
        )
    }

    pub fn initiate_invoice_payment(&self) -> InitiateInvoicePayment {
        InitiateInvoicePayment::new(self.ledger.clone(), self.initiate_payment())
    }

    pub fn refresh_status(&self) -> RefreshStatus {
        RefreshStatus::new(
            self.transactions.clone(),
            self.ledger.clone(),
            self.credentials.clone(),
            self.checkout_client.clone(),
            self.sync.clone(),
        )
    }

    pub fn handle_checkout_event(&self) -> HandleCheckoutEvent {
        HandleCheckoutEvent::new(
            self.transactions.clone(),
            self.credentials.clone(),
            self.sync.clone(),
        )
    }

    pub fn invoice_payments(&self) -> InvoicePayments {
        InvoicePayments::new(self.transactions.clone(), self.ledger.clone())
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .route("/api/payment/initiate", post(handlers::payments::initiate))
        .route(
            "/api/payment/status/:transaction_id",
            get(handlers::payments::status),
        )
        .route(
            "/api/payment/invoice/:invoice_id",
            get(handlers::payments::invoice_payments),
        )
        .route(
            "/api/payment/invoice/:invoice_id/initiate",
            post(handlers::payments::initiate_for_invoice),
        )
        .route("/webhook", post(handlers::webhook::checkout_event))
        .layer(axum::middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
