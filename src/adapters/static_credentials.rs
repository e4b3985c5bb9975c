use async_trait::async_trait;

use crate::config::Config;
use crate::ports::{CredentialSource, RepositoryResult};
use crate::provider::ProviderCredentials;

/// Credentials fixed at startup, from the environment or a test.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialSource {
    credentials: Option<ProviderCredentials>,
}

impl StaticCredentialSource {
    pub fn new(credentials: Option<ProviderCredentials>) -> Self {
        Self { credentials }
    }

    /// `None` when the environment carries no provider API key.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.provider_api_key.clone()?;
        let mut credentials =
            ProviderCredentials::new(api_key, config.provider_error_url.clone().unwrap_or_default());
        if let Some(template) = &config.provider_success_url {
            credentials = credentials.with_success_url_template(template.clone());
        }
        if let Some(secret) = &config.provider_webhook_secret {
            credentials = credentials.with_webhook_secret(secret.clone());
        }
        Some(Self::new(Some(credentials)))
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn active(&self) -> RepositoryResult<Option<ProviderCredentials>> {
        Ok(self.credentials.clone())
    }
}
