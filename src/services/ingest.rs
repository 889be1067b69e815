//! Canonical payment-event validation and idempotent ledger append.

use crate::error::AppError;
use crate::models::{NewPaymentEvent, PaymentEvent};
use crate::services::metrics::record_event_ingested;
use crate::services::Database;
use anyhow::anyhow;

/// Outcome of an ingest call: the ledger row plus whether this call wrote it.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub event: PaymentEvent,
    pub created: bool,
}

/// Boundary validation of the canonical form. Providers already reject
/// structurally malformed payloads; this guards the invariants the ledger
/// promises downstream.
pub fn validate(event: &NewPaymentEvent) -> Result<(), AppError> {
    if event.amount_cents <= 0 {
        return Err(AppError::BadRequest(anyhow!(
            "amount_cents must be positive, got {}",
            event.amount_cents
        )));
    }
    if event.provider_event_id.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow!(
            "provider_event_id must not be empty"
        )));
    }
    if event.currency.len() != 3 {
        return Err(AppError::BadRequest(anyhow!(
            "currency must be a 3-letter code, got {:?}",
            event.currency
        )));
    }
    Ok(())
}

/// Append the event to the ledger, treating a redelivery as an idempotent
/// no-op that returns the existing row.
pub async fn ingest_event(
    db: &Database,
    event: &NewPaymentEvent,
) -> Result<IngestReceipt, AppError> {
    validate(event)?;

    let (stored, created) = db.insert_payment_event(event).await?;

    if created {
        record_event_ingested(stored.provider.as_str());
    } else {
        tracing::info!(
            event_id = %stored.event_id,
            provider = %stored.provider,
            provider_event_id = %stored.provider_event_id,
            "Duplicate payment event delivery, returning existing ledger row"
        );
    }

    Ok(IngestReceipt {
        event: stored,
        created,
    })
}
