//! Decision policy over scored candidates.
//!
//! The policy itself is pure; persistence and idempotency against the
//! match table live in the pipeline.

use crate::config::MatchPolicy;
use crate::models::{BookingCandidate, MatchOutcome};

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: BookingCandidate,
    pub score: u32,
}

#[derive(Debug)]
pub struct Decision {
    pub outcome: MatchOutcome,
    pub winner: Option<ScoredCandidate>,
}

/// Apply thresholds and tie-breaking to scored candidates.
///
/// Ties on the top score prefer the earliest event date; a tie that
/// survives the date comparison is ambiguous and goes to review regardless
/// of score.
pub fn decide(mut scored: Vec<ScoredCandidate>, policy: &MatchPolicy) -> Decision {
    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.candidate.event_date.cmp(&b.candidate.event_date))
            .then(a.candidate.booking_id.cmp(&b.candidate.booking_id))
    });

    let Some(top) = scored.first() else {
        return Decision {
            outcome: MatchOutcome::Unmatched,
            winner: None,
        };
    };

    if top.score < policy.review_threshold {
        return Decision {
            outcome: MatchOutcome::Unmatched,
            winner: None,
        };
    }

    let ambiguous = scored
        .iter()
        .skip(1)
        .any(|c| c.score == top.score && c.candidate.event_date == top.candidate.event_date);

    let outcome = if ambiguous {
        MatchOutcome::PendingReview
    } else if top.score >= policy.auto_threshold {
        MatchOutcome::AutoMatched
    } else {
        MatchOutcome::PendingReview
    };

    Decision {
        outcome,
        winner: Some(top.clone()),
    }
}
