//! Review queue and match review actions for the admin API.

use crate::error::AppError;
use crate::middleware::admin_user;
use crate::models::{MatchFailure, MatchMethod, MatchStatus, PaymentMatch, ReviewQueueEntry};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const QUEUE_LIMIT: i64 = 100;

#[derive(Debug, Serialize)]
pub struct ReviewQueueResponse {
    pub decisions: Vec<ReviewQueueEntry>,
    pub failures: Vec<MatchFailure>,
}

/// Decisions and pipeline failures awaiting an operator.
pub async fn review_queue(
    State(state): State<AppState>,
) -> Result<Json<ReviewQueueResponse>, AppError> {
    let decisions = state.db.list_review_queue(QUEUE_LIMIT).await?;
    let failures = state.db.list_match_failures(QUEUE_LIMIT).await?;

    Ok(Json(ReviewQueueResponse {
        decisions,
        failures,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    /// "confirm" or "ignore".
    pub action: String,
    /// Required for confirm unless the decision already names a candidate.
    pub booking_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub payment_match: PaymentMatch,
}

/// Apply a reviewer's verdict to a payment event.
///
/// Confirm writes a manual match; the partial unique index rejects it while
/// a non-ignored match stands, so an override must ignore first.
pub async fn review_match(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, AppError> {
    let reviewer = admin_user(&headers);

    let event = state
        .db
        .get_payment_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment event not found")))?;

    match payload.action.as_str() {
        "confirm" => {
            if state.db.get_active_match(event_id).await?.is_some() {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "A non-ignored match already exists; ignore it before confirming another"
                )));
            }

            let decision = state.db.get_decision(event_id).await?;

            let booking_id = payload
                .booking_id
                .or_else(|| decision.as_ref().and_then(|d| d.booking_id))
                .ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!(
                        "booking_id is required when the decision has no candidate"
                    ))
                })?;

            // Carry the engine's score forward only when the reviewer kept
            // its candidate.
            let (score, confidence) = match &decision {
                Some(d) if d.booking_id == Some(booking_id) => (d.score, d.confidence),
                _ => (0, 0.0),
            };

            let m = state
                .db
                .insert_match(
                    event_id,
                    booking_id,
                    score,
                    confidence,
                    MatchMethod::Manual.as_str(),
                    MatchStatus::Manual.as_str(),
                    Some(&reviewer),
                    payload.notes.as_deref(),
                )
                .await?;

            tracing::info!(
                payment_event_id = %event_id,
                booking_id = %booking_id,
                reviewed_by = %reviewer,
                "Match confirmed by reviewer"
            );

            Ok(Json(ReviewResponse { payment_match: m }))
        }
        "ignore" => {
            let m = state
                .db
                .ignore_active_match(event_id, &reviewer, payload.notes.as_deref())
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!(
                        "No active match to ignore for payment event {}",
                        event.event_id
                    ))
                })?;

            tracing::info!(
                payment_event_id = %event_id,
                match_id = %m.match_id,
                reviewed_by = %reviewer,
                "Match ignored by reviewer"
            );

            Ok(Json(ReviewResponse { payment_match: m }))
        }
        other => Err(AppError::BadRequest(anyhow::anyhow!(
            "Unknown review action {:?}",
            other
        ))),
    }
}
