use async_trait::async_trait;
use sqlx::PgPool;

use crate::ports::{CredentialSource, RepositoryResult};
use crate::provider::ProviderCredentials;

/// Reads the most recent active row of `provider_configs`.
#[derive(Clone)]
pub struct PostgresCredentialSource {
    pool: PgPool,
}

impl PostgresCredentialSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProviderConfigRow {
    api_key: String,
    error_url: String,
    success_url_template: Option<String>,
    webhook_secret: Option<String>,
}

#[async_trait]
impl CredentialSource for PostgresCredentialSource {
    async fn active(&self) -> RepositoryResult<Option<ProviderCredentials>> {
        let row = sqlx::query_as::<_, ProviderConfigRow>(
            r#"
            SELECT api_key, error_url, success_url_template, webhook_secret
            FROM provider_configs
            WHERE is_active
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let mut credentials = ProviderCredentials::new(row.api_key, row.error_url);
            if let Some(template) = row.success_url_template {
                credentials = credentials.with_success_url_template(template);
            }
            if let Some(secret) = row.webhook_secret {
                credentials = credentials.with_webhook_secret(secret);
            }
            credentials
        }))
    }
}
