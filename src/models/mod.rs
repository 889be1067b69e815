//! Domain models for payment-recon.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Payment Event Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    Plaid,
    Manual,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Plaid => "plaid",
            Self::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "stripe" => Self::Stripe,
            "plaid" => Self::Plaid,
            _ => Self::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Ach,
    Venmo,
    Zelle,
    Cash,
    Check,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Ach => "ach",
            Self::Venmo => "venmo",
            Self::Zelle => "zelle",
            Self::Cash => "cash",
            Self::Check => "check",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "card" => Self::Card,
            "ach" => Self::Ach,
            "venmo" => Self::Venmo,
            "zelle" => Self::Zelle,
            "check" => Self::Check,
            _ => Self::Cash,
        }
    }
}

/// One externally observed payment, append-only after ingest.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentEvent {
    pub event_id: Uuid,
    pub provider: String,
    pub provider_event_id: String,
    pub method: String,
    pub amount_cents: i64,
    pub currency: String,
    pub occurred_utc: DateTime<Utc>,
    pub memo: Option<String>,
    #[serde(skip_serializing)]
    pub raw_data: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

/// Canonical form a provider payload is reduced to before the ledger insert.
#[derive(Debug, Clone)]
pub struct NewPaymentEvent {
    pub provider: PaymentProvider,
    pub provider_event_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub currency: String,
    pub occurred_utc: DateTime<Utc>,
    pub memo: Option<String>,
    pub raw_data: serde_json::Value,
}

// ============================================================================
// Booking Models (read model owned by the booking subsystem)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    New,
    DepositPending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::DepositPending => "deposit_pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "deposit_pending" => Self::DepositPending,
            "confirmed" => Self::Confirmed,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            "no_show" => Self::NoShow,
            _ => Self::New,
        }
    }
}

/// A booking joined with the customer contact fields the scorer consumes.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BookingCandidate {
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub event_date: NaiveDate,
    pub status: String,
    pub deposit_due_cents: i64,
    pub total_due_cents: i64,
    pub paid_cents: i64,
    pub last_reminder_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
}

impl BookingCandidate {
    pub fn balance_due_cents(&self) -> i64 {
        self.total_due_cents - self.paid_cents
    }
}

// ============================================================================
// Match Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Auto,
    Manual,
    Ignored,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Ignored => "ignored",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "manual" => Self::Manual,
            "ignored" => Self::Ignored,
            _ => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Auto,
    Manual,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

/// A decision linking a payment event to a booking.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentMatch {
    pub match_id: Uuid,
    pub payment_event_id: Uuid,
    pub booking_id: Uuid,
    pub score: i32,
    pub confidence: f64,
    pub match_method: String,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

// ============================================================================
// Decision Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    AutoMatched,
    PendingReview,
    Unmatched,
}

impl MatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoMatched => "auto_matched",
            Self::PendingReview => "pending_review",
            Self::Unmatched => "unmatched",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "auto_matched" => Self::AutoMatched,
            "pending_review" => Self::PendingReview,
            _ => Self::Unmatched,
        }
    }
}

/// The record other subsystems subscribe to: outcome plus the winning
/// booking, if any. One current row per payment event.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MatchDecision {
    pub payment_event_id: Uuid,
    pub outcome: String,
    pub booking_id: Option<Uuid>,
    pub score: i32,
    pub confidence: f64,
    pub decided_utc: DateTime<Utc>,
}

/// A review-queue row: the decision joined with the payment facts an
/// operator needs to act on it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReviewQueueEntry {
    pub payment_event_id: Uuid,
    pub outcome: String,
    pub booking_id: Option<Uuid>,
    pub score: i32,
    pub confidence: f64,
    pub decided_utc: DateTime<Utc>,
    pub provider: String,
    pub method: String,
    pub amount_cents: i64,
    pub currency: String,
    pub occurred_utc: DateTime<Utc>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MatchFailure {
    pub failure_id: Uuid,
    pub payment_event_id: Uuid,
    pub error: String,
    pub created_utc: DateTime<Utc>,
}
