//! Stripe webhook endpoint.

use crate::error::AppError;
use crate::services::ingest;
use crate::services::metrics::record_webhook_delivery;
use crate::startup::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::json;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Stripe webhook handler.
///
/// Verifies the signature, reduces recognized event types to the canonical
/// ledger form, and acks fast; matching runs after the response.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!(security = true, "Missing stripe-signature header");
            record_webhook_delivery("stripe", "invalid_signature");
            AppError::Unauthorized(anyhow::anyhow!("Missing webhook signature"))
        })?;

    let is_valid = state
        .stripe
        .verify_signature(&body, signature)
        .map_err(|e| {
            tracing::warn!(security = true, error = %e, "Malformed stripe-signature header");
            record_webhook_delivery("stripe", "invalid_signature");
            AppError::Unauthorized(anyhow::anyhow!("Invalid webhook signature"))
        })?;

    if !is_valid {
        tracing::warn!(security = true, "Stripe webhook signature verification failed");
        record_webhook_delivery("stripe", "invalid_signature");
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    let event = state.stripe.parse_event(&body).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse Stripe webhook payload");
        record_webhook_delivery("stripe", "invalid_payload");
        e
    })?;

    let raw: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid webhook body: {}", e)))?;

    let Some(canonical) = state.stripe.canonicalize(&event, raw).map_err(|e| {
        record_webhook_delivery("stripe", "invalid_payload");
        e
    })?
    else {
        tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event type");
        record_webhook_delivery("stripe", "ignored");
        return Ok(Json(json!({
            "status": "processed",
            "type": event.event_type,
        })));
    };

    let receipt = ingest::ingest_event(&state.db, &canonical).await?;

    if receipt.created {
        record_webhook_delivery("stripe", "processed");
        state.engine.spawn(receipt.event.clone());
    } else {
        record_webhook_delivery("stripe", "duplicate");
    }

    Ok(Json(json!({
        "status": "processed",
        "type": event.event_type,
        "event_id": receipt.event.event_id,
        "duplicate": !receipt.created,
    })))
}
