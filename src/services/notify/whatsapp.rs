//! WhatsApp Business API channel.

use super::{ChannelReceipt, NotifyChannel, NotifyError};
use crate::config::WhatsAppConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct WhatsAppRequest<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    message_type: &'static str,
    text: WhatsAppText<'a>,
}

#[derive(Debug, Serialize)]
struct WhatsAppText<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct WhatsAppResponse {
    #[serde(default)]
    messages: Vec<WhatsAppMessageId>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppMessageId {
    id: String,
}

pub struct WhatsAppChannel {
    config: WhatsAppConfig,
    client: Client,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> Self {
        // Outbound sends must not hold the pipeline hostage.
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl NotifyChannel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, to: &str, body: &str) -> Result<ChannelReceipt, NotifyError> {
        if !self.config.enabled {
            return Err(NotifyError::NotEnabled(
                "WhatsApp channel is not enabled".to_string(),
            ));
        }

        if to.is_empty() {
            return Err(NotifyError::InvalidRecipient(
                "Recipient is empty".to_string(),
            ));
        }

        let request = WhatsAppRequest {
            messaging_product: "whatsapp",
            to,
            message_type: "text",
            text: WhatsAppText { body },
        };

        let response = self
            .client
            .post(format!("{}/messages", self.config.api_url))
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::Connection(format!("WhatsApp request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::SendFailed(format!(
                "WhatsApp API returned {}: {}",
                status, body
            )));
        }

        let parsed: WhatsAppResponse = response.json().await.map_err(|e| {
            NotifyError::SendFailed(format!("Failed to parse WhatsApp response: {}", e))
        })?;

        tracing::info!(to = %to, "WhatsApp message sent");

        Ok(ChannelReceipt {
            provider_id: parsed.messages.into_iter().next().map(|m| m.id),
        })
    }
}
