//! The reconciliation pipeline: candidates → scores → decision → commit.

pub mod decider;
pub mod memo;
pub mod scorer;

use crate::config::MatchPolicy;
use crate::error::AppError;
use crate::models::{
    MatchDecision, MatchMethod, MatchOutcome, MatchStatus, PaymentEvent, PaymentMatch,
};
use crate::services::metrics::{record_error, record_match_decision};
use crate::services::notify::Dispatcher;
use crate::services::Database;
use chrono::Duration;
use decider::{decide, ScoredCandidate};
use memo::MemoSignals;
use scorer::score_candidate;
use std::sync::Arc;

/// What a pipeline run produced for a payment event.
#[derive(Debug)]
pub enum PipelineResult {
    /// A non-ignored match already existed; the run was an idempotent no-op.
    Existing(PaymentMatch),
    Decided(MatchDecision),
}

/// The reconciliation engine, constructed once at startup and shared.
pub struct MatchingEngine {
    db: Arc<Database>,
    policy: MatchPolicy,
    dispatcher: Arc<Dispatcher>,
}

impl MatchingEngine {
    pub fn new(db: Arc<Database>, policy: MatchPolicy, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            db,
            policy,
            dispatcher,
        }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Run the pipeline on a background task after the webhook ack.
    ///
    /// Failures never reach the webhook caller; they land in the operator
    /// failure queue.
    pub fn spawn(self: &Arc<Self>, event: PaymentEvent) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let event_id = event.event_id;
            if let Err(e) = engine.process_event(&event).await {
                tracing::error!(
                    payment_event_id = %event_id,
                    error = %e,
                    "Match pipeline failed, queueing for operator attention"
                );
                record_error("match_pipeline");
                if let Err(log_err) = engine
                    .db
                    .insert_match_failure(event_id, &e.to_string())
                    .await
                {
                    tracing::error!(
                        payment_event_id = %event_id,
                        error = %log_err,
                        "Failed to record match failure"
                    );
                }
            }
        });
    }

    /// Decide a single payment event.
    ///
    /// Re-running with a non-ignored match in place returns the existing
    /// match untouched.
    pub async fn process_event(&self, event: &PaymentEvent) -> Result<PipelineResult, AppError> {
        if let Some(existing) = self.db.get_active_match(event.event_id).await? {
            tracing::debug!(
                payment_event_id = %event.event_id,
                match_id = %existing.match_id,
                "Active match already exists, skipping decision"
            );
            return Ok(PipelineResult::Existing(existing));
        }

        let occurred = event.occurred_utc.date_naive();
        let window_start = occurred - Duration::days(self.policy.window_days_before);
        let window_end = occurred + Duration::days(self.policy.window_days_after);

        let candidates = self
            .db
            .find_candidate_bookings(window_start, window_end, self.policy.candidate_limit)
            .await?;

        let signals = MemoSignals::parse(event.memo.as_deref());

        let scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| ScoredCandidate {
                score: score_candidate(event, &signals, &candidate, &self.policy),
                candidate,
            })
            .collect();

        let decision = decide(scored, &self.policy);

        let (booking_id, score) = match &decision.winner {
            Some(winner) => (Some(winner.candidate.booking_id), winner.score),
            None => (None, 0),
        };
        let confidence = score as f64 / self.policy.score_cap as f64;

        let stored = self
            .db
            .upsert_decision(
                event.event_id,
                decision.outcome.as_str(),
                booking_id,
                score as i32,
                confidence,
            )
            .await?;

        if let (MatchOutcome::AutoMatched, Some(winner_id)) = (decision.outcome, booking_id) {
            match self
                .db
                .insert_match(
                    event.event_id,
                    winner_id,
                    score as i32,
                    confidence,
                    MatchMethod::Auto.as_str(),
                    MatchStatus::Auto.as_str(),
                    None,
                    None,
                )
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        payment_event_id = %event.event_id,
                        booking_id = %winner_id,
                        score = score,
                        "Payment auto-matched"
                    );
                }
                // Lost a commit race to a concurrent redelivery; the other
                // writer's match stands.
                Err(AppError::Conflict(_)) => {
                    if let Some(existing) = self.db.get_active_match(event.event_id).await? {
                        return Ok(PipelineResult::Existing(existing));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        record_match_decision(decision.outcome.as_str());
        tracing::info!(
            payment_event_id = %event.event_id,
            outcome = %decision.outcome.as_str(),
            score = score,
            confidence = confidence,
            "Match decision recorded"
        );

        let winner_candidate = decision.winner.as_ref().map(|w| &w.candidate);
        self.dispatcher
            .dispatch_decision(event, &stored, winner_candidate)
            .await;

        Ok(PipelineResult::Decided(stored))
    }
}
