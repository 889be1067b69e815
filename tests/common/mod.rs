//! Common test utilities for payment-recon integration tests.
//!
//! These tests need a PostgreSQL instance; set `TEST_DATABASE_URL` to run
//! them. Without it each test logs a skip notice and returns early.

#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use payment_recon::config::{
    AdminConfig, CommonConfig, DatabaseConfig, MatchPolicy, NotifyConfig, ReconConfig, SmsConfig,
    WebhookConfig, WhatsAppConfig,
};
use payment_recon::models::MatchDecision;
use payment_recon::services::Database;
use payment_recon::startup::Application;
use secrecy::SecretString;
use std::sync::Once;
use std::time::Duration;
use uuid::Uuid;

pub const STRIPE_TEST_SECRET: &str = "whsec_test123secret456";
pub const PLAID_TEST_SECRET: &str = "plaid_test_secret";
pub const ADMIN_TEST_TOKEN: &str = "test-admin-token";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,payment_recon=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Whether a test database is configured; tests bail out quietly when not.
pub fn db_available() -> bool {
    if std::env::var("TEST_DATABASE_URL").is_err() {
        eprintln!("TEST_DATABASE_URL not set; skipping integration test");
        return false;
    }
    true
}

fn test_config(database_url: String) -> ReconConfig {
    ReconConfig {
        common: CommonConfig { port: 0 },
        service_name: "payment-recon-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 4,
            min_connections: 1,
        },
        webhooks: WebhookConfig {
            stripe_secret: SecretString::new(STRIPE_TEST_SECRET.to_string()),
            plaid_secret: SecretString::new(PLAID_TEST_SECRET.to_string()),
            stripe_tolerance_secs: 300,
        },
        admin: AdminConfig {
            api_token: SecretString::new(ADMIN_TEST_TOKEN.to_string()),
        },
        match_policy: MatchPolicy::default(),
        notify: NotifyConfig {
            // No recipient and disabled channels: dispatch is a no-op.
            admin_recipient: String::new(),
            whatsapp: WhatsAppConfig {
                enabled: false,
                api_url: String::new(),
                access_token: SecretString::new(String::new()),
            },
            sms: SmsConfig {
                enabled: false,
                api_url: String::new(),
                api_key: SecretString::new(String::new()),
                sender_id: "TEST".to_string(),
            },
        },
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub db: Database,
}

/// Spawn a test application against a clean schema.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let database_url =
        std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set (see db_available)");

    let config = test_config(database_url.clone());
    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let db = Database::new(&database_url, 2, 1)
        .await
        .expect("Failed to open test database handle");

    truncate_all(&db).await;

    let client = reqwest::Client::new();
    let base_url = format!("http://127.0.0.1:{}", port);

    // Wait for the server to come up.
    let mut attempts = 0;
    loop {
        match client.get(format!("{}/health", base_url)).send().await {
            Ok(resp) if resp.status().is_success() => break,
            _ if attempts < 20 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            other => panic!("Server did not become healthy: {:?}", other),
        }
    }

    TestApp {
        base_url,
        client,
        db,
    }
}

async fn truncate_all(db: &Database) {
    sqlx::query(
        "TRUNCATE integra.notification_log, integra.match_failures, integra.match_decisions, \
         integra.payment_matches, integra.payment_events, integra.bookings, integra.customers CASCADE",
    )
    .execute(db.pool())
    .await
    .expect("Failed to truncate test schema");
}

/// Compute a valid `stripe-signature` header for a raw body.
pub fn stripe_signature(body: &str, secret: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let signature =
        payment_recon::utils::hmac_sha256_hex(secret, &format!("{}.{}", timestamp, body)).unwrap();
    format!("t={},v1={}", timestamp, signature)
}

/// Compute a valid `Plaid-Signature` header for a raw body.
pub fn plaid_signature(body: &str, secret: &str) -> String {
    payment_recon::utils::hmac_sha256_hex(secret, body).unwrap()
}

/// Insert a customer and one open booking; returns (customer_id, booking_id).
pub async fn seed_customer_with_booking(
    db: &Database,
    name: &str,
    phone: Option<&str>,
    email: Option<&str>,
    deposit_due_cents: i64,
    total_due_cents: i64,
    event_date: NaiveDate,
) -> (Uuid, Uuid) {
    let customer_id = seed_customer(db, name, phone, email).await;
    let booking_id = seed_booking(db, customer_id, deposit_due_cents, total_due_cents, event_date).await;
    (customer_id, booking_id)
}

pub async fn seed_customer(
    db: &Database,
    name: &str,
    phone: Option<&str>,
    email: Option<&str>,
) -> Uuid {
    let customer_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO integra.customers (customer_id, full_name, phone, email) VALUES ($1, $2, $3, $4)",
    )
    .bind(customer_id)
    .bind(name)
    .bind(phone)
    .bind(email)
    .execute(db.pool())
    .await
    .expect("Failed to seed customer");
    customer_id
}

pub async fn seed_booking(
    db: &Database,
    customer_id: Uuid,
    deposit_due_cents: i64,
    total_due_cents: i64,
    event_date: NaiveDate,
) -> Uuid {
    let booking_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO integra.bookings (booking_id, customer_id, event_date, status, deposit_due_cents, total_due_cents) \
         VALUES ($1, $2, $3, 'deposit_pending', $4, $5)",
    )
    .bind(booking_id)
    .bind(customer_id)
    .bind(event_date)
    .bind(deposit_due_cents)
    .bind(total_due_cents)
    .execute(db.pool())
    .await
    .expect("Failed to seed booking");
    booking_id
}

/// Poll for the pipeline's decision on an event; the pipeline runs on a
/// background task after the webhook ack.
pub async fn wait_for_decision(db: &Database, event_id: Uuid) -> Option<MatchDecision> {
    for _ in 0..50 {
        if let Some(decision) = db
            .get_decision(event_id)
            .await
            .expect("Failed to query decision")
        {
            return Some(decision);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    None
}

/// Count non-ignored matches for an event.
pub async fn active_match_count(db: &Database, event_id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM integra.payment_matches WHERE payment_event_id = $1 AND status <> 'ignored'",
    )
    .bind(event_id)
    .fetch_one(db.pool())
    .await
    .expect("Failed to count matches")
}

/// Count ledger rows for a provider event id.
pub async fn event_count(db: &Database, provider: &str, provider_event_id: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM integra.payment_events WHERE provider = $1 AND provider_event_id = $2",
    )
    .bind(provider)
    .bind(provider_event_id)
    .fetch_one(db.pool())
    .await
    .expect("Failed to count events")
}

/// A signed Stripe `charge.succeeded` body with current timestamps.
pub fn stripe_charge_body(
    event_id: &str,
    amount_cents: i64,
    description: Option<&str>,
    billing_name: Option<&str>,
    billing_email: Option<&str>,
    billing_phone: Option<&str>,
) -> String {
    let now = Utc::now().timestamp();
    serde_json::json!({
        "id": event_id,
        "type": "charge.succeeded",
        "created": now,
        "data": {
            "object": {
                "id": format!("ch_{}", event_id),
                "object": "charge",
                "amount": amount_cents,
                "currency": "usd",
                "created": now,
                "description": description,
                "billing_details": {
                    "name": billing_name,
                    "email": billing_email,
                    "phone": billing_phone
                },
                "payment_method_details": { "type": "card" }
            }
        }
    })
    .to_string()
}
