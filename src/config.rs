use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

pub const DEFAULT_PROVIDER_API_URL: &str = "https://api.wave.com/v1";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub provider_api_url: String,
    /// Prefix of the payment communication, e.g. `Wave cos-123`.
    pub provider_label: String,
    pub payment_journal_code: String,
    pub ledger_actor: String,
    pub log_format: LogFormat,
    pub provider_api_key: Option<String>,
    pub provider_error_url: Option<String>,
    pub provider_success_url: Option<String>,
    pub provider_webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            provider_api_url: env::var("PROVIDER_API_URL")
                .unwrap_or_else(|_| DEFAULT_PROVIDER_API_URL.to_string()),
            provider_label: env::var("PROVIDER_LABEL").unwrap_or_else(|_| "Wave".to_string()),
            payment_journal_code: env::var("PAYMENT_JOURNAL_CODE")
                .unwrap_or_else(|_| "CSH1".to_string()),
            ledger_actor: env::var("LEDGER_ACTOR").unwrap_or_else(|_| "system".to_string()),
            log_format: parse_log_format(&env::var("LOG_FORMAT").unwrap_or_default())?,
            provider_api_key: non_empty_var("PROVIDER_API_KEY"),
            provider_error_url: non_empty_var("PROVIDER_ERROR_URL"),
            provider_success_url: non_empty_var("PROVIDER_SUCCESS_URL"),
            provider_webhook_secret: non_empty_var("PROVIDER_WEBHOOK_SECRET"),
        })
    }

    /// Checks values that parse fine but cannot work at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.provider_api_url)
            .map_err(|e| anyhow::anyhow!("PROVIDER_API_URL is not a valid URL: {}", e))?;

        if self.provider_api_key.is_some() && self.provider_error_url.is_none() {
            anyhow::bail!("PROVIDER_ERROR_URL is required when PROVIDER_API_KEY is set");
        }
        if let Some(error_url) = &self.provider_error_url {
            url::Url::parse(error_url)
                .map_err(|e| anyhow::anyhow!("PROVIDER_ERROR_URL is not a valid URL: {}", e))?;
        }
        if self.payment_journal_code.trim().is_empty() {
            anyhow::bail!("PAYMENT_JOURNAL_CODE must not be empty");
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_log_format(raw: &str) -> anyhow::Result<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
    }
}
