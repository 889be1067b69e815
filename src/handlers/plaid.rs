//! Plaid webhook endpoint.

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

const SIGNATURE_HEADER: &str = "plaid-signature";

/// Plaid webhook handler; same contract as the Stripe endpoint.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!(security = true, "Missing Plaid-Signature header");
            record_webhook_delivery("plaid", "invalid_signature");
            AppError::Unauthorized(anyhow::anyhow!("Missing webhook signature"))
        })?;

    let is_valid = state
        .plaid
        .verify_signature(&body, signature)
        .map_err(|e| {
            tracing::warn!(security = true, error = %e, "Malformed Plaid-Signature header");
            record_webhook_delivery("plaid", "invalid_signature");
            AppError::Unauthorized(anyhow::anyhow!("Invalid webhook signature"))
        })?;

    if !is_valid {
        tracing::warn!(security = true, "Plaid webhook signature verification failed");
        record_webhook_delivery("plaid", "invalid_signature");
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    let event = state.plaid.parse_event(&body).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse Plaid webhook payload");
        record_webhook_delivery("plaid", "invalid_payload");
        e
    })?;

    let raw: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid webhook body: {}", e)))?;

    let Some(canonical) = state.plaid.canonicalize(&event, raw).map_err(|e| {
        record_webhook_delivery("plaid", "invalid_payload");
        e
    })?
    else {
        tracing::debug!(
            webhook_type = %event.webhook_type,
            webhook_code = %event.webhook_code,
            "Plaid webhook carries no inbound payment"
        );
        record_webhook_delivery("plaid", "ignored");
        return Ok(Json(json!({
            "status": "processed",
            "type": event.webhook_type,
        })));
    };

    let receipt = ingest::ingest_event(&state.db, &canonical).await?;

    if receipt.created {
        record_webhook_delivery("plaid", "processed");
        state.engine.spawn(receipt.event.clone());
    } else {
        record_webhook_delivery("plaid", "duplicate");
    }

    Ok(Json(json!({
        "status": "processed",
        "type": event.webhook_type,
        "event_id": receipt.event.event_id,
        "duplicate": !receipt.created,
    })))
}
