//! Plaid webhook handling.
//!
//! Verifies the `Plaid-Signature` header (HMAC-SHA256 hex over the raw
//! body) and reduces enriched transaction webhooks to canonical payment
//! events.

use crate::config::WebhookConfig;
use crate::error::AppError;
use crate::models::{NewPaymentEvent, PaymentMethod, PaymentProvider};
use crate::utils::{hmac_sha256_hex, signatures_match};
use anyhow::{anyhow, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PlaidEvent {
    pub webhook_type: String,
    pub webhook_code: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub transaction: Option<PlaidTransaction>,
}

/// The enriched transaction the upstream sync attaches to the webhook.
#[derive(Debug, Deserialize)]
pub struct PlaidTransaction {
    pub transaction_id: String,
    /// Signed dollars. Plaid reports account outflows as positive, so a
    /// deposit into the business account arrives negative.
    pub amount: f64,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
}

/// Plaid webhook verifier and canonicalizer.
#[derive(Clone)]
pub struct PlaidWebhook {
    secret: SecretString,
}

impl PlaidWebhook {
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            secret: config.plaid_secret.clone(),
        }
    }

    /// Verify the `Plaid-Signature` header against the raw request body.
    pub fn verify_signature(&self, body: &str, signature: &str) -> Result<bool> {
        let expected = hmac_sha256_hex(self.secret.expose_secret(), body)?;
        Ok(signatures_match(&expected, signature))
    }

    pub fn parse_event(&self, body: &str) -> Result<PlaidEvent, AppError> {
        serde_json::from_str(body)
            .map_err(|e| AppError::BadRequest(anyhow!("Invalid Plaid payload: {}", e)))
    }

    /// Reduce a transactions webhook to a canonical payment event.
    ///
    /// Returns `None` for non-transaction webhook types and for outflows;
    /// both are acked without side effects.
    pub fn canonicalize(
        &self,
        event: &PlaidEvent,
        raw: serde_json::Value,
    ) -> Result<Option<NewPaymentEvent>, AppError> {
        if event.webhook_type != "TRANSACTIONS" {
            return Ok(None);
        }

        let Some(txn) = &event.transaction else {
            return Ok(None);
        };

        let amount_cents = (-txn.amount * 100.0).round() as i64;
        if amount_cents <= 0 {
            // Outflow or zero amount: not a payment into the account.
            return Ok(None);
        }

        let occurred_utc = Utc
            .from_utc_datetime(&txn.date.and_hms_opt(0, 0, 0).unwrap_or_default());

        let memo = build_memo(txn);
        let method = detect_method(memo.as_deref());

        Ok(Some(NewPaymentEvent {
            provider: PaymentProvider::Plaid,
            provider_event_id: txn.transaction_id.clone(),
            method,
            amount_cents,
            currency: txn
                .iso_currency_code
                .clone()
                .unwrap_or_else(|| "USD".to_string()),
            occurred_utc,
            memo,
            raw_data: raw,
        }))
    }
}

fn build_memo(txn: &PlaidTransaction) -> Option<String> {
    let parts: Vec<String> = [&txn.name, &txn.merchant_name]
        .into_iter()
        .filter_map(|f| f.as_deref())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

/// Bank descriptors carry the P2P rail name when one was used.
fn detect_method(memo: Option<&str>) -> PaymentMethod {
    let Some(memo) = memo else {
        return PaymentMethod::Ach;
    };
    let upper = memo.to_uppercase();
    if upper.contains("ZELLE") {
        PaymentMethod::Zelle
    } else if upper.contains("VENMO") {
        PaymentMethod::Venmo
    } else {
        PaymentMethod::Ach
    }
}
