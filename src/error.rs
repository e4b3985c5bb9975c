use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::{LedgerError, RepositoryError};
use crate::provider::signature::SignatureError;
use crate::use_cases::{
    InitiateError, InvoicePaymentsError, RefreshError, WebhookError,
};
use crate::validation::ValidationError;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("No active payment provider configuration")]
    ConfigurationMissing,

    /// Provider rejection; the message is the provider's raw text.
    #[error("{0}")]
    Provider(String),

    #[error("{message}")]
    Reconciliation { kind: &'static str, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_)
            | AppError::BadRequest(_)
            | AppError::ConfigurationMissing
            | AppError::Provider(_)
            | AppError::Reconciliation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Message shown to the caller. Internal faults stay opaque.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let mut body = json!({
            "success": false,
            "error": self.public_message(),
            "status": status.as_u16(),
        });
        if let AppError::Reconciliation { kind, .. } = &self {
            body["kind"] = json!(kind);
        }

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<InitiateError> for AppError {
    fn from(e: InitiateError) -> Self {
        match e {
            InitiateError::Validation(e) => e.into(),
            InitiateError::ConfigurationMissing => AppError::ConfigurationMissing,
            e @ (InitiateError::InvoiceNotFound(_) | InitiateError::PartnerNotFound(_)) => {
                AppError::BadRequest(e.to_string())
            }
            InitiateError::Provider(e) => AppError::Provider(e.to_string()),
            InitiateError::Store(e) => e.into(),
            InitiateError::Ledger(e) => e.into(),
        }
    }
}

impl From<RefreshError> for AppError {
    fn from(e: RefreshError) -> Self {
        match e {
            e @ RefreshError::TransactionNotFound(_) => AppError::BadRequest(e.to_string()),
            RefreshError::Store(e) => e.into(),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::ConfigurationMissing => AppError::ConfigurationMissing,
            WebhookError::Signature(e @ SignatureError::InvalidSecret) => {
                AppError::Internal(e.to_string())
            }
            WebhookError::Signature(e) => AppError::Unauthorized(e.to_string()),
            WebhookError::Reconciliation(e) => AppError::Reconciliation {
                kind: e.kind(),
                message: e.to_string(),
            },
            WebhookError::Store(e) => e.into(),
            e @ (WebhookError::MalformedPayload(_)
            | WebhookError::UnhandledEvent(_)
            | WebhookError::MissingSessionId
            | WebhookError::TransactionNotFound(_)) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<InvoicePaymentsError> for AppError {
    fn from(e: InvoicePaymentsError) -> Self {
        match e {
            e @ InvoicePaymentsError::InvoiceNotFound(_) => AppError::NotFound(e.to_string()),
            InvoicePaymentsError::Store(e) => e.into(),
            InvoicePaymentsError::Ledger(e) => e.into(),
        }
    }
}
