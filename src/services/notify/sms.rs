//! SMS gateway channel, used as the fallback rail.

use super::{ChannelReceipt, NotifyChannel, NotifyError};
use crate::config::SmsConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    sender: &'a str,
    to: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct SmsResponse {
    #[serde(default)]
    message_id: Option<String>,
}

pub struct SmsChannel {
    config: SmsConfig,
    client: Client,
}

impl SmsChannel {
    pub fn new(config: SmsConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl NotifyChannel for SmsChannel {
    fn name(&self) -> &'static str {
        "sms"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, to: &str, body: &str) -> Result<ChannelReceipt, NotifyError> {
        if !self.config.enabled {
            return Err(NotifyError::NotEnabled(
                "SMS channel is not enabled".to_string(),
            ));
        }

        // Normalize phone number (digits plus a leading +).
        let normalized: String = to
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();

        if normalized.is_empty() {
            return Err(NotifyError::InvalidRecipient(
                "Phone number is empty".to_string(),
            ));
        }

        let request = SmsRequest {
            sender: &self.config.sender_id,
            to: &normalized,
            message: body,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::Connection(format!("SMS gateway request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::SendFailed(format!(
                "SMS gateway returned {}: {}",
                status, body
            )));
        }

        let parsed: SmsResponse = response.json().await.unwrap_or(SmsResponse {
            message_id: None,
        });

        tracing::info!(to = %normalized, "SMS sent");

        Ok(ChannelReceipt {
            provider_id: parsed.message_id,
        })
    }
}
