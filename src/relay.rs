//! Outbound SMS relay used by the alert endpoint.
//!
//! The relay is best-effort: it has no delivery confirmation beyond the
//! success or failure of the HTTP call itself, and callers log failures
//! instead of failing the alert.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::DEFAULT_HTTP_TIMEOUT;

/// Default Fast2SMS bulk endpoint.
const FAST2SMS_API_URL: &str = "https://www.fast2sms.com/dev/bulkV2";

/// Sends a text message to a list of numbers.
#[async_trait]
pub trait NotificationRelay: Send + Sync {
    async fn send(&self, numbers: &[String], message: &str) -> anyhow::Result<()>;
}

/// Client for the Fast2SMS bulk API.
#[derive(Clone)]
pub struct Fast2SmsRelay {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct BulkSmsRequest<'a> {
    route: &'static str,
    message: &'a str,
    language: &'static str,
    numbers: String,
}

impl Fast2SmsRelay {
    /// Create a relay against the public Fast2SMS endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(FAST2SMS_API_URL, api_key)
    }

    /// Create a relay with a custom endpoint (for testing).
    pub fn with_base_url(base_url: &str, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl NotificationRelay for Fast2SmsRelay {
    async fn send(&self, numbers: &[String], message: &str) -> anyhow::Result<()> {
        if numbers.is_empty() {
            return Ok(());
        }

        let body = BulkSmsRequest {
            route: "q",
            message,
            language: "english",
            numbers: numbers.join(","),
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("authorization", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        info!(
            recipients = numbers.len(),
            status = %response.status(),
            "SMS relay accepted message"
        );
        Ok(())
    }
}

/// Relay used when no API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRelay;

#[async_trait]
impl NotificationRelay for DisabledRelay {
    async fn send(&self, numbers: &[String], _message: &str) -> anyhow::Result<()> {
        debug!(recipients = numbers.len(), "SMS relay disabled, message dropped");
        Ok(())
    }
}
