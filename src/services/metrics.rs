//! Prometheus metrics for payment-recon.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for webhook deliveries by provider and result.
pub static WEBHOOK_DELIVERIES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_webhook_deliveries_total",
        "Total number of webhook deliveries",
        &["provider", "result"]
    )
    .expect("Failed to register WEBHOOK_DELIVERIES")
});

/// Counter for payment events appended to the ledger.
pub static EVENTS_INGESTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_payment_events_ingested_total",
        "Total number of payment events ingested",
        &["provider"]
    )
    .expect("Failed to register EVENTS_INGESTED")
});

/// Counter for match decisions by outcome.
pub static MATCH_DECISIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_match_decisions_total",
        "Total number of match decisions",
        &["outcome"]
    )
    .expect("Failed to register MATCH_DECISIONS")
});

/// Counter for notifications by channel and status.
pub static NOTIFICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_notifications_total",
        "Total number of notification attempts",
        &["channel", "status"]
    )
    .expect("Failed to register NOTIFICATIONS")
});

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "recon_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&WEBHOOK_DELIVERIES);
    Lazy::force(&EVENTS_INGESTED);
    Lazy::force(&MATCH_DECISIONS);
    Lazy::force(&NOTIFICATIONS);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a webhook delivery.
pub fn record_webhook_delivery(provider: &str, result: &str) {
    WEBHOOK_DELIVERIES
        .with_label_values(&[provider, result])
        .inc();
}

/// Record a ledger insert.
pub fn record_event_ingested(provider: &str) {
    EVENTS_INGESTED.with_label_values(&[provider]).inc();
}

/// Record a match decision.
pub fn record_match_decision(outcome: &str) {
    MATCH_DECISIONS.with_label_values(&[outcome]).inc();
}

/// Record a notification attempt.
pub fn record_notification(channel: &str, status: &str) {
    NOTIFICATIONS.with_label_values(&[channel, status]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
