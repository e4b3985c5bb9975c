use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::status::{map_status, TransactionStatus};
use crate::provider::ProviderCredentials;
use crate::utils::timestamp::parse_provider_timestamp;

/// Outbound deadline for every provider call. Not retried.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Non-2xx answer. Displays the provider's raw body unchanged.
    #[error("{body}")]
    Api { status: u16, body: String },
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Body of `POST /checkout/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub amount: BigDecimal,
    pub currency: String,
    pub success_url: String,
    pub error_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_reference: Option<String>,
}

/// Wire shape of a checkout session, in API responses and webhook events.
#[derive(Debug, Deserialize)]
struct SessionPayload {
    id: String,
    #[serde(default)]
    wave_launch_url: Option<String>,
    #[serde(default)]
    launch_url: Option<String>,
    #[serde(default)]
    checkout_url: Option<String>,
    #[serde(default)]
    checkout_status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    when_completed: Option<String>,
}

/// A checkout session snapshot as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub checkout_url: Option<String>,
    pub checkout_status: Option<String>,
    pub payment_status: Option<String>,
    pub when_completed: Option<String>,
    /// The untouched payload, kept for audit.
    pub raw: serde_json::Value,
}

impl CheckoutSession {
    pub fn from_value(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        let payload: SessionPayload = serde_json::from_value(raw.clone())?;
        Ok(Self {
            id: payload.id,
            checkout_url: payload
                .wave_launch_url
                .or(payload.launch_url)
                .or(payload.checkout_url),
            checkout_status: payload.checkout_status,
            payment_status: payload.payment_status,
            when_completed: payload.when_completed,
            raw,
        })
    }

    pub fn internal_status(&self) -> TransactionStatus {
        map_status(
            self.checkout_status.as_deref().unwrap_or_default(),
            self.payment_status.as_deref().unwrap_or_default(),
        )
    }

    pub fn completed_at(&self) -> Option<NaiveDateTime> {
        parse_provider_timestamp(self.when_completed.as_deref())
    }
}

/// HTTP client for the mobile-money provider's checkout API.
#[derive(Clone)]
pub struct CheckoutClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl CheckoutClient {
    pub fn new(base_url: String) -> Self {
        Self::with_circuit_breaker(base_url, 5, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        CheckoutClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/checkout/sessions", self.base_url.trim_end_matches('/'))
    }

    /// Opens a checkout session for the payer.
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
        credentials: &ProviderCredentials,
    ) -> Result<CheckoutSession, ProviderError> {
        let request_builder = self
            .client
            .post(self.sessions_url())
            .bearer_auth(credentials.api_key())
            .json(request);

        let result = self
            .circuit_breaker
            .call_with(trips_breaker, async move {
                let response = request_builder.send().await?;
                let status = response.status();
                let body = response.text().await?;

                if !status.is_success() {
                    tracing::error!(status = status.as_u16(), body = %body, "Provider rejected checkout session");
                    return Err(ProviderError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }

                parse_session(&body)
            })
            .await;

        self.unwrap_breaker(result)
    }

    /// Fetches a session. A session the provider does not know is `None`.
    pub async fn get_session(
        &self,
        session_id: &str,
        credentials: &ProviderCredentials,
    ) -> Result<Option<CheckoutSession>, ProviderError> {
        let request_builder = self
            .client
            .get(format!("{}/{}", self.sessions_url(), session_id))
            .bearer_auth(credentials.api_key());

        let result = self
            .circuit_breaker
            .call_with(trips_breaker, async move {
                let response = request_builder.send().await?;
                let status = response.status();

                if status == StatusCode::NOT_FOUND {
                    return Ok(None);
                }

                let body = response.text().await?;
                if !status.is_success() {
                    return Err(ProviderError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }

                parse_session(&body).map(Some)
            })
            .await;

        self.unwrap_breaker(result)
    }

    fn unwrap_breaker<T>(
        &self,
        result: Result<T, FailsafeError<ProviderError>>,
    ) -> Result<T, ProviderError> {
        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(ProviderError::CircuitBreakerOpen(
                "provider API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

/// Only an unhealthy provider opens the breaker. A 4xx answer to a bad
/// request says nothing about the provider's health.
fn trips_breaker(error: &ProviderError) -> bool {
    match error {
        ProviderError::RequestError(_) => true,
        ProviderError::Api { status, .. } => *status >= 500 || *status == 429,
        ProviderError::InvalidResponse(_) | ProviderError::CircuitBreakerOpen(_) => false,
    }
}

fn parse_session(body: &str) -> Result<CheckoutSession, ProviderError> {
    let raw: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("{e}; body={body}")))?;
    CheckoutSession::from_value(raw)
        .map_err(|e| ProviderError::InvalidResponse(format!("{e}; body={body}")))
}
