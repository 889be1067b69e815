//! Stripe webhook handling.
//!
//! Verifies the `stripe-signature` header scheme
//! (`t=<ts>,v1=<hmac-sha256 hex over "<ts>.<body>">` with a bounded
//! timestamp age) and reduces recognized event types to canonical payment
//! events.

use crate::config::WebhookConfig;
use crate::error::AppError;
use crate::models::{NewPaymentEvent, PaymentMethod, PaymentProvider};
use crate::utils::{hmac_sha256_hex, signatures_match};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Stripe event envelope.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: StripeObject,
}

/// The charge or payment-intent entity inside the event envelope.
#[derive(Debug, Deserialize)]
pub struct StripeObject {
    pub id: String,
    pub object: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_received: Option<i64>,
    pub currency: String,
    pub created: i64,
    pub description: Option<String>,
    pub billing_details: Option<BillingDetails>,
    pub payment_method_details: Option<PaymentMethodDetails>,
}

#[derive(Debug, Deserialize)]
pub struct BillingDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodDetails {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Stripe webhook verifier and canonicalizer.
#[derive(Clone)]
pub struct StripeWebhook {
    secret: SecretString,
    tolerance_secs: i64,
}

impl StripeWebhook {
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            secret: config.stripe_secret.clone(),
            tolerance_secs: config.stripe_tolerance_secs,
        }
    }

    /// Verify the `stripe-signature` header against the raw request body.
    pub fn verify_signature(&self, body: &str, header: &str) -> Result<bool> {
        self.verify_signature_at(body, header, Utc::now().timestamp())
    }

    fn verify_signature_at(&self, body: &str, header: &str, now: i64) -> Result<bool> {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", v)) => timestamp = v.parse().ok(),
                Some(("v1", v)) => candidates.push(v),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| anyhow!("Missing timestamp in signature"))?;
        if candidates.is_empty() {
            return Err(anyhow!("Missing v1 signature"));
        }

        // Stale timestamps are replays even when the HMAC checks out.
        if (now - timestamp).abs() > self.tolerance_secs {
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp, body);
        let expected = hmac_sha256_hex(self.secret.expose_secret(), &signed_payload)?;

        Ok(candidates.iter().any(|c| signatures_match(&expected, c)))
    }

    /// Parse the raw body into a typed Stripe event.
    pub fn parse_event(&self, body: &str) -> Result<StripeEvent, AppError> {
        serde_json::from_str(body)
            .map_err(|e| AppError::BadRequest(anyhow!("Invalid Stripe payload: {}", e)))
    }

    /// Reduce a recognized event to a canonical payment event.
    ///
    /// Returns `None` for event types this engine does not ingest; the
    /// webhook still acks them with no side effects.
    pub fn canonicalize(
        &self,
        event: &StripeEvent,
        raw: serde_json::Value,
    ) -> Result<Option<NewPaymentEvent>, AppError> {
        match event.event_type.as_str() {
            "charge.succeeded" | "payment_intent.succeeded" => {}
            _ => return Ok(None),
        }

        let object = &event.data.object;
        let amount_cents = object.amount_received.unwrap_or(object.amount);
        if amount_cents <= 0 {
            return Err(AppError::BadRequest(anyhow!(
                "Stripe event {} has non-positive amount {}",
                event.id,
                amount_cents
            )));
        }

        let occurred_utc = DateTime::<Utc>::from_timestamp(object.created, 0)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(event.created, 0).unwrap_or_default());

        let method = match object
            .payment_method_details
            .as_ref()
            .and_then(|d| d.kind.as_deref())
        {
            Some("us_bank_account") | Some("ach_debit") | Some("ach_credit_transfer") => {
                PaymentMethod::Ach
            }
            _ => PaymentMethod::Card,
        };

        Ok(Some(NewPaymentEvent {
            provider: PaymentProvider::Stripe,
            provider_event_id: event.id.clone(),
            method,
            amount_cents,
            currency: object.currency.to_uppercase(),
            occurred_utc,
            memo: build_memo(object),
            raw_data: raw,
        }))
    }
}

/// Fold description and billing contact hints into the memo the matcher
/// parses; payer identity often only shows up here.
fn build_memo(object: &StripeObject) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(description) = object.description.as_deref() {
        if !description.is_empty() {
            parts.push(description.to_string());
        }
    }
    if let Some(billing) = &object.billing_details {
        for field in [&billing.name, &billing.email, &billing.phone] {
            if let Some(value) = field.as_deref() {
                if !value.is_empty() {
                    parts.push(value.to_string());
                }
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;

    fn test_webhook() -> StripeWebhook {
        StripeWebhook::new(&WebhookConfig {
            stripe_secret: SecretString::new("whsec_test123secret456".to_string()),
            plaid_secret: SecretString::new(String::new()),
            stripe_tolerance_secs: 300,
        })
    }

    fn sign(body: &str, secret: &str, timestamp: i64) -> String {
        let payload = format!("{}.{}", timestamp, body);
        let signature = hmac_sha256_hex(secret, &payload).unwrap();
        format!("t={},v1={}", timestamp, signature)
    }

    fn charge_body(event_id: &str, amount: i64) -> String {
        serde_json::json!({
            "id": event_id,
            "type": "charge.succeeded",
            "created": 1717243800,
            "data": {
                "object": {
                    "id": "ch_123",
                    "object": "charge",
                    "amount": amount,
                    "currency": "usd",
                    "created": 1717243800,
                    "description": "Hibachi deposit",
                    "billing_details": {
                        "name": "Jane Doe",
                        "email": "jane@example.com",
                        "phone": "+15551234567"
                    },
                    "payment_method_details": { "type": "card" }
                }
            }
        })
        .to_string()
    }

    #[test]
    fn valid_signature_accepted() {
        let webhook = test_webhook();
        let body = charge_body("evt_1", 55000);
        let header = sign(&body, "whsec_test123secret456", Utc::now().timestamp());
        assert!(webhook.verify_signature(&body, &header).unwrap());
    }

    #[test]
    fn wrong_secret_rejected() {
        let webhook = test_webhook();
        let body = charge_body("evt_1", 55000);
        let header = sign(&body, "wrong_secret", Utc::now().timestamp());
        assert!(!webhook.verify_signature(&body, &header).unwrap());
    }

    #[test]
    fn stale_timestamp_rejected() {
        let webhook = test_webhook();
        let body = charge_body("evt_1", 55000);
        let header = sign(
            &body,
            "whsec_test123secret456",
            Utc::now().timestamp() - 600,
        );
        assert!(!webhook.verify_signature(&body, &header).unwrap());
    }

    #[test]
    fn missing_timestamp_errors() {
        let webhook = test_webhook();
        let body = charge_body("evt_1", 55000);
        assert!(webhook.verify_signature(&body, "v1=deadbeef").is_err());
    }

    #[test]
    fn charge_succeeded_canonicalized() {
        let webhook = test_webhook();
        let body = charge_body("evt_1", 55000);
        let event = webhook.parse_event(&body).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&body).unwrap();

        let canonical = webhook.canonicalize(&event, raw).unwrap().unwrap();
        assert_eq!(canonical.provider, PaymentProvider::Stripe);
        assert_eq!(canonical.provider_event_id, "evt_1");
        assert_eq!(canonical.method, PaymentMethod::Card);
        assert_eq!(canonical.amount_cents, 55000);
        assert_eq!(canonical.currency, "USD");
        let memo = canonical.memo.unwrap();
        assert!(memo.contains("Jane Doe"));
        assert!(memo.contains("jane@example.com"));
    }

    #[test]
    fn unrecognized_type_skipped() {
        let webhook = test_webhook();
        let body = serde_json::json!({
            "id": "evt_2",
            "type": "customer.created",
            "created": 1717243800,
            "data": { "object": { "id": "cus_1", "object": "customer", "currency": "usd", "created": 1717243800 } }
        })
        .to_string();
        let event = webhook.parse_event(&body).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert!(webhook.canonicalize(&event, raw).unwrap().is_none());
    }

    #[test]
    fn non_positive_amount_rejected() {
        let webhook = test_webhook();
        let body = charge_body("evt_3", 0);
        let event = webhook.parse_event(&body).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert!(webhook.canonicalize(&event, raw).is_err());
    }

    #[test]
    fn ach_method_mapped() {
        let webhook = test_webhook();
        let body = serde_json::json!({
            "id": "evt_4",
            "type": "charge.succeeded",
            "created": 1717243800,
            "data": {
                "object": {
                    "id": "ch_4",
                    "object": "charge",
                    "amount": 20000,
                    "currency": "usd",
                    "created": 1717243800,
                    "payment_method_details": { "type": "us_bank_account" }
                }
            }
        })
        .to_string();
        let event = webhook.parse_event(&body).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&body).unwrap();

        let canonical = webhook.canonicalize(&event, raw).unwrap().unwrap();
        assert_eq!(canonical.method, PaymentMethod::Ach);
        assert!(canonical.memo.is_none());
    }
}
