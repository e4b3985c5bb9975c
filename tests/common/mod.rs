#![allow(dead_code)]

use bigdecimal::BigDecimal;
use checkout_reconciler::adapters::{
    InMemoryLedger, InMemoryTransactionRepository, StaticCredentialSource,
};
use checkout_reconciler::domain::ledger::{
    ElevatedCredential, Invoice, InvoicePaymentState, InvoiceState, Journal, JournalKind,
    PaymentMethodLine,
};
use checkout_reconciler::domain::transaction::{NewTransaction, Transaction};
use checkout_reconciler::ports::TransactionRepository;
use checkout_reconciler::provider::{CheckoutClient, ProviderCredentials};
use checkout_reconciler::services::ReconciliationEngine;
use checkout_reconciler::{create_app, AppState};
use serde_json::json;
use std::sync::Arc;

pub const INVOICE_ID: i64 = 7;
pub const PARTNER_ID: i64 = 3;
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const PARTNER_PHONE: &str = "+221770000000";

pub struct TestApp {
    pub base_url: String,
    pub provider: mockito::ServerGuard,
    pub ledger: Arc<InMemoryLedger>,
    pub transactions: Arc<InMemoryTransactionRepository>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Stores a pending transaction as if it had been initiated.
    pub async fn seed(&self, transaction_id: &str, session_id: &str, amount: i64) -> Transaction {
        self.transactions
            .create(NewTransaction {
                transaction_id: transaction_id.to_string(),
                provider_session_id: session_id.to_string(),
                amount: BigDecimal::from(amount),
                currency: "XOF".to_string(),
                invoice_id: INVOICE_ID,
                partner_id: PARTNER_ID,
                phone_number: "+221770000000".to_string(),
                description: None,
                reference: None,
                payment_link_url: Some(format!("https://pay.wave.com/c/{}", session_id)),
                checkout_status: Some("open".to_string()),
                payment_status: Some("processing".to_string()),
                raw_provider_response: None,
            })
            .await
            .unwrap()
    }
}

pub fn credentials() -> ProviderCredentials {
    ProviderCredentials::new("wave_test_key", "https://shop.example/error")
        .with_success_url_template("https://shop.example/wave?transaction={transaction_id}")
}

pub fn invoice(residual: i64) -> Invoice {
    Invoice {
        id: INVOICE_ID,
        name: "INV/2025/0007".to_string(),
        company_id: 1,
        partner_id: PARTNER_ID,
        state: InvoiceState::Posted,
        currency: "XOF".to_string(),
        amount_total: BigDecimal::from(1000),
        amount_residual: BigDecimal::from(residual),
        payment_state: InvoicePaymentState::from_amounts(
            &BigDecimal::from(1000),
            &BigDecimal::from(residual),
        ),
    }
}

pub fn ledger() -> InMemoryLedger {
    InMemoryLedger::new()
        .with_partner_phone(PARTNER_ID, "Awa Diop", PARTNER_PHONE)
        .with_invoice(invoice(1000))
        .with_journal(Journal {
            id: 10,
            company_id: 1,
            code: "CSH1".to_string(),
            name: "Cash".to_string(),
            kind: JournalKind::Cash,
            inbound_method_lines: vec![PaymentMethodLine {
                id: 11,
                journal_id: 10,
                name: "Manual Payment".to_string(),
                code: "manual".to_string(),
            }],
        })
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(Some(credentials()), ledger()).await
}

pub async fn spawn_app_with(
    credentials: Option<ProviderCredentials>,
    ledger: InMemoryLedger,
) -> TestApp {
    let provider = mockito::Server::new_async().await;
    let ledger = Arc::new(ledger);
    let transactions = Arc::new(InMemoryTransactionRepository::new());

    let engine = ReconciliationEngine::new(
        ledger.clone(),
        transactions.clone(),
        ElevatedCredential::new("wave-bot"),
    );
    let state = AppState::new(
        transactions.clone(),
        ledger.clone(),
        Arc::new(StaticCredentialSource::new(credentials)),
        CheckoutClient::new(provider.url()),
        engine,
    );
    let app = create_app(state);

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(app.into_make_service());
    let actual_addr = server.local_addr();

    tokio::spawn(async move {
        server.await.unwrap();
    });

    TestApp {
        base_url: format!("http://{}", actual_addr),
        provider,
        ledger,
        transactions,
        client: reqwest::Client::new(),
    }
}

pub fn session_body(id: &str, checkout_status: &str, payment_status: &str) -> String {
    json!({
        "id": id,
        "amount": "1000",
        "currency": "XOF",
        "checkout_status": checkout_status,
        "payment_status": payment_status,
        "wave_launch_url": format!("https://pay.wave.com/c/{}", id),
        "when_completed": "2025-11-01T12:34:56Z",
    })
    .to_string()
}

pub fn completed_event(session_id: &str) -> serde_json::Value {
    json!({
        "id": "EV_1",
        "type": "checkout.session.completed",
        "data": {
            "id": session_id,
            "amount": "1000",
            "currency": "XOF",
            "checkout_status": "complete",
            "payment_status": "succeeded",
            "when_completed": "2025-11-01T12:34:56Z",
            "client_reference": "T1",
        }
    })
}
