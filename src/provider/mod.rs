pub mod client;
pub mod signature;

use std::fmt;

pub use client::{CheckoutClient, CheckoutRequest, CheckoutSession, ProviderError};

/// Placeholder replaced by the caller's transaction id in success URLs.
pub const TRANSACTION_PLACEHOLDER: &str = "{transaction_id}";

/// The active provider configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    api_key: String,
    pub error_url: String,
    pub success_url_template: Option<String>,
    pub webhook_secret: Option<String>,
}

impl ProviderCredentials {
    pub fn new(api_key: impl Into<String>, error_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            error_url: error_url.into(),
            success_url_template: None,
            webhook_secret: None,
        }
    }

    pub fn with_success_url_template(mut self, template: impl Into<String>) -> Self {
        self.success_url_template = Some(template.into());
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Success URL for a transaction, from the configured template. Falls back
    /// to the error URL with a `transaction` query parameter.
    pub fn success_url_for(&self, transaction_id: &str) -> String {
        match &self.success_url_template {
            Some(template) if template.contains(TRANSACTION_PLACEHOLDER) => {
                template.replace(TRANSACTION_PLACEHOLDER, transaction_id)
            }
            Some(template) => template.clone(),
            None => {
                let separator = if self.error_url.contains('?') { '&' } else { '?' };
                format!("{}{}transaction={}", self.error_url, separator, transaction_id)
            }
        }
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &"****")
            .field("error_url", &self.error_url)
            .field("success_url_template", &self.success_url_template)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "****"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_url_substitutes_transaction_id() {
        let creds = ProviderCredentials::new("k", "https://shop.example/error")
            .with_success_url_template("https://shop.example/wave-paiement?transaction={transaction_id}");
        assert_eq!(
            creds.success_url_for("T1"),
            "https://shop.example/wave-paiement?transaction=T1"
        );
    }

    #[test]
    fn success_url_falls_back_to_error_url() {
        let creds = ProviderCredentials::new("k", "https://shop.example/cb?src=wave");
        assert_eq!(
            creds.success_url_for("T1"),
            "https://shop.example/cb?src=wave&transaction=T1"
        );
    }

    #[test]
    fn debug_masks_secrets() {
        let creds = ProviderCredentials::new("wave_sn_prod_key", "https://e").with_webhook_secret("s");
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("wave_sn_prod_key"));
        assert!(rendered.contains("****"));
    }
}
