//! Notification dispatch: WhatsApp-primary with SMS fallback.
//!
//! Dispatch is best-effort and decoupled from the matching transaction; a
//! send failure never unwinds a committed match.

pub mod sms;
pub mod whatsapp;

use crate::config::{MatchPolicy, NotifyConfig};
use crate::models::{BookingCandidate, MatchDecision, MatchOutcome, PaymentEvent};
use crate::services::metrics::record_notification;
use crate::services::Database;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use sms::SmsChannel;
pub use whatsapp::WhatsAppChannel;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Channel not enabled: {0}")]
    NotEnabled(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[derive(Debug, Clone)]
pub struct ChannelReceipt {
    pub provider_id: Option<String>,
}

/// A message channel the dispatcher can hand a text to.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    async fn send(&self, to: &str, body: &str) -> Result<ChannelReceipt, NotifyError>;
}

/// Try the primary channel, falling back to the secondary on any failure.
/// Returns the channel that accepted the message.
pub async fn send_with_fallback(
    primary: &dyn NotifyChannel,
    fallback: &dyn NotifyChannel,
    to: &str,
    body: &str,
) -> Result<&'static str, NotifyError> {
    match primary.send(to, body).await {
        Ok(_) => Ok(primary.name()),
        Err(primary_err) => {
            tracing::warn!(
                channel = primary.name(),
                error = %primary_err,
                "Primary notification channel failed, trying fallback"
            );
            record_notification(primary.name(), "failed");
            fallback.send(to, body).await.map(|_| fallback.name())
        }
    }
}

/// Decision-outcome notifier for staff and (on confident auto-matches)
/// customers.
pub struct Dispatcher {
    db: Arc<Database>,
    primary: Arc<dyn NotifyChannel>,
    fallback: Arc<dyn NotifyChannel>,
    admin_recipient: String,
    customer_notify_confidence: f64,
}

impl Dispatcher {
    pub fn from_config(db: Arc<Database>, notify: &NotifyConfig, policy: &MatchPolicy) -> Self {
        Self {
            db,
            primary: Arc::new(WhatsAppChannel::new(notify.whatsapp.clone())),
            fallback: Arc::new(SmsChannel::new(notify.sms.clone())),
            admin_recipient: notify.admin_recipient.clone(),
            customer_notify_confidence: policy.customer_notify_confidence,
        }
    }

    /// Construct with explicit channels; used by tests.
    pub fn with_channels(
        db: Arc<Database>,
        primary: Arc<dyn NotifyChannel>,
        fallback: Arc<dyn NotifyChannel>,
        admin_recipient: String,
        customer_notify_confidence: f64,
    ) -> Self {
        Self {
            db,
            primary,
            fallback,
            admin_recipient,
            customer_notify_confidence,
        }
    }

    /// Send the per-outcome notifications for a committed decision.
    ///
    /// Every failure path here is logged and counted, never propagated.
    pub async fn dispatch_decision(
        &self,
        event: &PaymentEvent,
        decision: &MatchDecision,
        winner: Option<&BookingCandidate>,
    ) {
        let outcome = MatchOutcome::from_str(&decision.outcome);

        if self.admin_recipient.is_empty() {
            tracing::debug!("No admin recipient configured, skipping staff notification");
        } else {
            let body = admin_message(event, decision, winner);
            self.deliver(event, &decision.outcome, "admin", &self.admin_recipient, &body)
                .await;
        }

        if outcome == MatchOutcome::AutoMatched
            && decision.confidence >= self.customer_notify_confidence
        {
            if let Some(phone) = winner.and_then(|w| w.customer_phone.as_deref()) {
                let body = customer_message(event, winner);
                self.deliver(event, &decision.outcome, "customer", phone, &body)
                    .await;
            }
        }
    }

    async fn deliver(
        &self,
        event: &PaymentEvent,
        outcome: &str,
        audience: &str,
        to: &str,
        body: &str,
    ) {
        let dispatch_key = format!("{}:{}:{}", event.event_id, outcome, audience);

        let claimed = match self
            .db
            .try_claim_dispatch(&dispatch_key, event.event_id, self.primary.name(), to)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(dispatch_key = %dispatch_key, error = %e, "Failed to claim dispatch key");
                record_notification("dispatch", "claim_failed");
                return;
            }
        };

        if !claimed {
            tracing::debug!(
                dispatch_key = %dispatch_key,
                "Dispatch key already claimed, skipping resend"
            );
            return;
        }

        match send_with_fallback(self.primary.as_ref(), self.fallback.as_ref(), to, body).await {
            Ok(channel) => {
                record_notification(channel, "sent");
                if let Err(e) = self
                    .db
                    .update_dispatch_status(&dispatch_key, channel, "sent", None)
                    .await
                {
                    tracing::warn!(dispatch_key = %dispatch_key, error = %e, "Failed to record dispatch status");
                }
            }
            Err(e) => {
                tracing::error!(
                    dispatch_key = %dispatch_key,
                    audience = audience,
                    error = %e,
                    "All notification channels failed"
                );
                record_notification(self.fallback.name(), "failed");
                if let Err(log_err) = self
                    .db
                    .update_dispatch_status(
                        &dispatch_key,
                        self.fallback.name(),
                        "failed",
                        Some(&e.to_string()),
                    )
                    .await
                {
                    tracing::warn!(dispatch_key = %dispatch_key, error = %log_err, "Failed to record dispatch status");
                }
            }
        }
    }
}

fn admin_message(
    event: &PaymentEvent,
    decision: &MatchDecision,
    winner: Option<&BookingCandidate>,
) -> String {
    let amount = format_cents(event.amount_cents, &event.currency);
    match MatchOutcome::from_str(&decision.outcome) {
        MatchOutcome::AutoMatched => format!(
            "Payment {} ({}) auto-matched to {}'s booking on {} (confidence {:.0}%).",
            amount,
            event.method,
            winner.map(|w| w.customer_name.as_str()).unwrap_or("unknown"),
            winner
                .map(|w| w.event_date.to_string())
                .unwrap_or_else(|| "?".to_string()),
            decision.confidence * 100.0
        ),
        MatchOutcome::PendingReview => format!(
            "Payment {} ({}) needs review: best candidate {} (confidence {:.0}%).",
            amount,
            event.method,
            winner.map(|w| w.customer_name.as_str()).unwrap_or("unknown"),
            decision.confidence * 100.0
        ),
        MatchOutcome::Unmatched => format!(
            "Unmatched payment {} ({}) received{}.",
            amount,
            event.method,
            event
                .memo
                .as_deref()
                .map(|m| format!(", memo: {}", m))
                .unwrap_or_default()
        ),
    }
}

fn customer_message(event: &PaymentEvent, winner: Option<&BookingCandidate>) -> String {
    format!(
        "We received your payment of {} for your hibachi event{}. Thank you!",
        format_cents(event.amount_cents, &event.currency),
        winner
            .map(|w| format!(" on {}", w.event_date))
            .unwrap_or_default()
    )
}

fn format_cents(cents: i64, currency: &str) -> String {
    format!("{} {}.{:02}", currency, cents / 100, cents % 100)
}

/// In-memory channel for tests.
pub struct MockChannel {
    channel_name: &'static str,
    enabled: bool,
    fail: bool,
    sent: std::sync::atomic::AtomicU64,
}

impl MockChannel {
    pub fn new(channel_name: &'static str, enabled: bool, fail: bool) -> Self {
        Self {
            channel_name,
            enabled,
            fail,
            sent: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl NotifyChannel for MockChannel {
    fn name(&self) -> &'static str {
        self.channel_name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, to: &str, _body: &str) -> Result<ChannelReceipt, NotifyError> {
        if !self.enabled {
            return Err(NotifyError::NotEnabled(self.channel_name.to_string()));
        }
        if self.fail {
            return Err(NotifyError::SendFailed(format!(
                "{} mock failure",
                self.channel_name
            )));
        }
        let n = self.sent.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        tracing::info!(to = %to, channel = self.channel_name, "[MOCK] message would be sent");
        Ok(ChannelReceipt {
            provider_id: Some(format!("mock-{}-{}", self.channel_name, n)),
        })
    }
}
