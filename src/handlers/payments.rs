//! Manual payment entry and payment-event lookup for the admin API.

use crate::error::AppError;
use crate::models::{
    MatchDecision, NewPaymentEvent, PaymentEvent, PaymentMatch, PaymentMethod, PaymentProvider,
};
use crate::services::ingest;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

const METHODS: &[&str] = &["card", "ach", "venmo", "zelle", "cash", "check"];

/// Request to record a payment observed outside the wired providers
/// (Zelle screenshot, cash at the event, a mailed check).
#[derive(Debug, Deserialize, Validate)]
pub struct ManualPaymentRequest {
    #[validate(range(min = 1))]
    pub amount_cents: i64,
    pub method: String,
    #[validate(length(min = 3, max = 3))]
    #[serde(default = "default_currency")]
    pub currency: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub memo: Option<String>,
    /// External reference for dedup; generated when absent.
    pub reference: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Serialize)]
pub struct ManualPaymentResponse {
    pub event: PaymentEvent,
    pub duplicate: bool,
}

/// Record a manual payment event and kick off matching.
pub async fn create_payment_event(
    State(state): State<AppState>,
    Json(payload): Json<ManualPaymentRequest>,
) -> Result<(StatusCode, Json<ManualPaymentResponse>), AppError> {
    payload.validate()?;

    if !METHODS.contains(&payload.method.as_str()) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Unknown payment method {:?}",
            payload.method
        )));
    }

    let canonical = NewPaymentEvent {
        provider: PaymentProvider::Manual,
        provider_event_id: payload
            .reference
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        method: PaymentMethod::from_str(&payload.method),
        amount_cents: payload.amount_cents,
        currency: payload.currency.to_uppercase(),
        occurred_utc: payload.occurred_at.unwrap_or_else(Utc::now),
        memo: payload.memo.clone(),
        raw_data: serde_json::json!({ "source": "manual_entry" }),
    };

    tracing::info!(
        amount_cents = payload.amount_cents,
        method = %payload.method,
        "Recording manual payment event"
    );

    let receipt = ingest::ingest_event(&state.db, &canonical).await?;

    if receipt.created {
        state.engine.spawn(receipt.event.clone());
    }

    Ok((
        StatusCode::CREATED,
        Json(ManualPaymentResponse {
            duplicate: !receipt.created,
            event: receipt.event,
        }),
    ))
}

/// A payment event with its current decision and active match.
#[derive(Debug, Serialize)]
pub struct PaymentEventDetail {
    pub event: PaymentEvent,
    pub decision: Option<MatchDecision>,
    pub payment_match: Option<PaymentMatch>,
}

pub async fn get_payment_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<PaymentEventDetail>, AppError> {
    let event = state
        .db
        .get_payment_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment event not found")))?;

    let decision = state.db.get_decision(event_id).await?;
    let payment_match = state.db.get_active_match(event_id).await?;

    Ok(Json(PaymentEventDetail {
        event,
        decision,
        payment_match,
    }))
}
