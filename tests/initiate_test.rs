mod common;

use checkout_reconciler::adapters::InMemoryLedger;
use common::{session_body, spawn_app, spawn_app_with};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn request(transaction_id: &str) -> Value {
    json!({
        "transaction_id": transaction_id,
        "invoice_id": common::INVOICE_ID,
        "partner_id": common::PARTNER_ID,
        "phone_number": "+221770000000",
        "amount": 1000,
        "description": "Invoice INV/2025/0007",
    })
}

#[tokio::test]
async fn test_initiate_creates_checkout_session() {
    let mut app = spawn_app().await;
    let mock = app
        .provider
        .mock("POST", "/checkout/sessions")
        .match_header("authorization", "Bearer wave_test_key")
        .match_body(mockito::Matcher::PartialJson(json!({
            "currency": "XOF",
            "success_url": "https://shop.example/wave?transaction=T1",
            "error_url": "https://shop.example/error",
        })))
        .with_status(200)
        .with_body(session_body("cos-1", "open", "processing"))
        .expect(1)
        .create_async()
        .await;

    let res = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&request("T1"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["existing"], false);
    assert_eq!(body["transaction_id"], "T1");
    assert_eq!(body["session_id"], "cos-1");
    assert_eq!(body["payment_url"], "https://pay.wave.com/c/cos-1");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amount"], "1000");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_initiate_is_idempotent_per_transaction_id() {
    let mut app = spawn_app().await;
    let mock = app
        .provider
        .mock("POST", "/checkout/sessions")
        .with_status(200)
        .with_body(session_body("cos-1", "open", "processing"))
        .expect(1)
        .create_async()
        .await;

    let first: Value = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&request("T1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: Value = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&request("T1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(second["existing"], true);
    assert_eq!(first["session_id"], second["session_id"]);
    assert_eq!(first["payment_url"], second["payment_url"]);
    assert_eq!(app.transactions.len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_initiate_accepts_legacy_field_names() {
    let mut app = spawn_app().await;
    app.provider
        .mock("POST", "/checkout/sessions")
        .with_status(200)
        .with_body(session_body("cos-9", "open", "processing"))
        .create_async()
        .await;

    let res = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&json!({
            "transaction_id": "T9",
            "facture_id": common::INVOICE_ID,
            "partner_id": common::PARTNER_ID,
            "phoneNumber": "77 000 00 00",
            "amount": "250.50",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["invoice_id"], common::INVOICE_ID);
    assert_eq!(body["amount"], "250.50");
}

#[tokio::test]
async fn test_initiate_rejects_missing_fields() {
    let app = spawn_app().await;

    let res = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&json!({ "transaction_id": "T1", "invoice_id": 7, "amount": 1000 }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "partner_id: is required");
    assert!(app.transactions.is_empty());
}

#[tokio::test]
async fn test_initiate_rejects_non_positive_amount() {
    let app = spawn_app().await;
    let mut payload = request("T1");
    payload["amount"] = json!(0);

    let res = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&payload)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "amount: must be greater than zero");
}

#[tokio::test]
async fn test_initiate_malformed_json_is_a_json_error() {
    let app = spawn_app().await;

    let res = app
        .client
        .post(app.url("/api/payment/initiate"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_initiate_passes_provider_error_through() {
    let mut app = spawn_app().await;
    app.provider
        .mock("POST", "/checkout/sessions")
        .with_status(400)
        .with_body("amount below minimum for XOF")
        .create_async()
        .await;

    let res = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&request("T1"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "amount below minimum for XOF");
    assert!(app.transactions.is_empty());
}

#[tokio::test]
async fn test_initiate_requires_known_invoice_and_partner() {
    let app = spawn_app().await;

    let mut payload = request("T1");
    payload["invoice_id"] = json!(999);
    let res = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Invoice 999 not found");

    let mut payload = request("T2");
    payload["partner_id"] = json!(404);
    let res = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Partner 404 not found");
}

#[tokio::test]
async fn test_initiate_without_configuration() {
    let app = spawn_app_with(None, InMemoryLedger::new()).await;

    let res = app
        .client
        .post(app.url("/api/payment/initiate"))
        .json(&request("T1"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "No active payment provider configuration");
}

#[tokio::test]
async fn test_invoice_initiate_charges_open_amount() {
    let mut app = spawn_app().await;
    let mock = app
        .provider
        .mock("POST", "/checkout/sessions")
        .match_body(mockito::Matcher::PartialJson(json!({
            "amount": "1000",
            "currency": "XOF",
            "success_url": "https://shop.example/wave?transaction=ORDER-12",
        })))
        .with_status(200)
        .with_body(session_body("cos-1", "open", "processing"))
        .expect(1)
        .create_async()
        .await;

    let res = app
        .client
        .post(app.url("/api/payment/invoice/7/initiate"))
        .json(&json!({ "transaction_id": "ORDER-12" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["existing"], false);
    assert_eq!(body["transaction_id"], "ORDER-12");
    assert_eq!(body["phone"], common::PARTNER_PHONE);
    assert_eq!(body["partner_id"], common::PARTNER_ID);
    assert_eq!(body["reference"], "INV/2025/0007");
    assert_eq!(body["description"], "Payment for invoice INV/2025/0007");
    assert_eq!(body["invoice"]["id"], common::INVOICE_ID);
    assert_eq!(body["invoice"]["payment_state"], "not_paid");

    assert_eq!(app.transactions.len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_invoice_initiate_generates_transaction_id_without_body() {
    let mut app = spawn_app().await;
    app.provider
        .mock("POST", "/checkout/sessions")
        .with_status(200)
        .with_body(session_body("cos-1", "open", "processing"))
        .create_async()
        .await;

    let res = app
        .client
        .post(app.url("/api/payment/invoice/7/initiate"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let transaction_id = body["transaction_id"].as_str().unwrap();
    assert!(transaction_id.starts_with("TXN-7-"));
    assert_eq!(transaction_id.len(), "TXN-7-".len() + 14);
}

#[tokio::test]
async fn test_invoice_initiate_rejects_unknown_or_unpayable_invoices() {
    let app = spawn_app_with(
        Some(common::credentials()),
        InMemoryLedger::new()
            .with_partner(common::PARTNER_ID, "Awa Diop")
            .with_invoice(common::invoice(1000)),
    )
    .await;

    let res = app
        .client
        .post(app.url("/api/payment/invoice/999/initiate"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Partner has no phone on file and none is supplied.
    let res = app
        .client
        .post(app.url("/api/payment/invoice/7/initiate"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "phone_number: partner has no phone number on file");

    let res = app
        .client
        .post(app.url("/api/payment/invoice/7/initiate"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(app.transactions.is_empty());
}
