//! Confidence scoring for (payment event, booking candidate) pairs.
//!
//! Scoring is a pure function of its inputs and the policy weight table so
//! every score can be reproduced for audit.

use crate::config::MatchPolicy;
use crate::models::{BookingCandidate, PaymentEvent};
use crate::services::matching::memo::{normalize_name, phone_digits, MemoSignals};

/// Score a candidate in `[0, policy.score_cap]`.
pub fn score_candidate(
    event: &PaymentEvent,
    signals: &MemoSignals,
    candidate: &BookingCandidate,
    policy: &MatchPolicy,
) -> u32 {
    let mut score: u32 = 0;

    // Amount signals are mutually exclusive; a payment cannot be both the
    // full balance and a partial deposit.
    let balance_due = candidate.balance_due_cents();
    if event.amount_cents == balance_due {
        score += policy.weight_exact_balance;
    } else if event.amount_cents == candidate.deposit_due_cents {
        score += policy.weight_exact_deposit;
    }

    if let Some(similarity) = best_name_similarity(signals, &candidate.customer_name) {
        if similarity >= policy.name_similarity_floor {
            score += (policy.weight_name_match as f64 * similarity).round() as u32;
        }
    }

    if phone_matches(signals, candidate.customer_phone.as_deref()) {
        score += policy.weight_phone_match;
    }

    if email_matches(signals, candidate.customer_email.as_deref()) {
        score += policy.weight_email_match;
    }

    score += temporal_score(event, candidate, policy);

    score.min(policy.score_cap)
}

/// Best Jaro-Winkler similarity between any extracted sender name and the
/// customer's full name.
fn best_name_similarity(signals: &MemoSignals, customer_name: &str) -> Option<f64> {
    let customer = normalize_name(customer_name);
    if customer.is_empty() {
        return None;
    }

    signals
        .sender_names
        .iter()
        .map(|sender| strsim::jaro_winkler(sender, &customer))
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

fn phone_matches(signals: &MemoSignals, customer_phone: Option<&str>) -> bool {
    let Some(customer_phone) = customer_phone else {
        return false;
    };
    let customer_digits = phone_digits(customer_phone);
    if customer_digits.len() < 10 {
        return false;
    }
    // Compare national numbers; country prefixes vary by provider.
    let customer_tail = &customer_digits[customer_digits.len() - 10..];
    signals
        .phones
        .iter()
        .any(|p| p.len() >= 10 && &p[p.len() - 10..] == customer_tail)
}

fn email_matches(signals: &MemoSignals, customer_email: Option<&str>) -> bool {
    let Some(customer_email) = customer_email else {
        return false;
    };
    let customer_email = customer_email.to_lowercase();
    signals.emails.iter().any(|e| *e == customer_email)
}

/// Proximity of the payment to the booking's creation or to the latest
/// reminder, decaying linearly to zero over the policy horizon.
fn temporal_score(event: &PaymentEvent, candidate: &BookingCandidate, policy: &MatchPolicy) -> u32 {
    if policy.temporal_horizon_days <= 0 {
        return 0;
    }

    let days_from_anchor = [Some(candidate.created_utc), candidate.last_reminder_utc]
        .into_iter()
        .flatten()
        .map(|anchor| (event.occurred_utc - anchor).num_days().abs())
        .min();

    match days_from_anchor {
        Some(days) if days <= policy.temporal_horizon_days => {
            let remaining = 1.0 - days as f64 / policy.temporal_horizon_days as f64;
            (policy.weight_temporal as f64 * remaining).round() as u32
        }
        _ => 0,
    }
}
