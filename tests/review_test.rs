//! Integration tests for the review queue and reviewer actions.

mod common;

use chrono::{Duration, Utc};
use common::*;
use serial_test::serial;

async fn create_pending_review_event(app: &TestApp) -> (uuid::Uuid, uuid::Uuid) {
    // Exact deposit plus temporal proximity but no contact signals lands in
    // the review band.
    let event_date = Utc::now().date_naive() + Duration::days(10);
    let (_, booking_id) = seed_customer_with_booking(
        &app.db,
        "Quentin Ashford",
        None,
        None,
        88800,
        240000,
        event_date,
    )
    .await;

    let response = app
        .client
        .post(format!("{}/api/payment-events", app.base_url))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&serde_json::json!({
            "amount_cents": 88800,
            "method": "venmo"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let json: serde_json::Value = response.json().await.unwrap();
    let event_id: uuid::Uuid = serde_json::from_value(json["event"]["event_id"].clone()).unwrap();

    let decision = wait_for_decision(&app.db, event_id)
        .await
        .expect("pipeline never decided");
    assert_eq!(decision.outcome, "pending_review");
    assert_eq!(decision.booking_id, Some(booking_id));

    (event_id, booking_id)
}

#[tokio::test]
#[serial]
async fn pending_review_appears_in_queue_and_confirm_clears_it() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let (event_id, booking_id) = create_pending_review_event(&app).await;

    let queue: serde_json::Value = app
        .client
        .get(format!("{}/api/review-queue", app.base_url))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let in_queue = queue["decisions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d["payment_event_id"] == serde_json::json!(event_id));
    assert!(in_queue, "pending decision missing from review queue");

    // Confirm without a booking_id: the decision's candidate is used.
    let confirm: serde_json::Value = app
        .client
        .post(format!(
            "{}/api/payment-events/{}/review",
            app.base_url, event_id
        ))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .header("x-admin-user", "ops-sam")
        .json(&serde_json::json!({ "action": "confirm", "notes": "verified via bank portal" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(confirm["payment_match"]["status"], "manual");
    assert_eq!(confirm["payment_match"]["match_method"], "manual");
    assert_eq!(confirm["payment_match"]["reviewed_by"], "ops-sam");
    assert_eq!(
        confirm["payment_match"]["booking_id"],
        serde_json::json!(booking_id)
    );

    let queue_after: serde_json::Value = app
        .client
        .get(format!("{}/api/review-queue", app.base_url))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let still_in_queue = queue_after["decisions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d["payment_event_id"] == serde_json::json!(event_id));
    assert!(!still_in_queue, "confirmed event should leave the queue");
}

#[tokio::test]
#[serial]
async fn confirm_with_active_match_conflicts_until_ignored() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    // Auto-match a payment first.
    let event_date = Utc::now().date_naive() + Duration::days(7);
    let (_, booking_id) = seed_customer_with_booking(
        &app.db,
        "Helena Voss",
        Some("+15557778888"),
        None,
        44400,
        120000,
        event_date,
    )
    .await;

    let provider_event_id = format!("evt_{}", uuid::Uuid::new_v4().simple());
    let body = stripe_charge_body(
        &provider_event_id,
        44400,
        None,
        Some("Helena Voss"),
        None,
        Some("+15557778888"),
    );
    let header = stripe_signature(&body, STRIPE_TEST_SECRET);
    let json: serde_json::Value = app
        .client
        .post(format!("{}/webhooks/stripe/webhook", app.base_url))
        .header("stripe-signature", &header)
        .body(body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let event_id: uuid::Uuid = serde_json::from_value(json["event_id"].clone()).unwrap();

    let decision = wait_for_decision(&app.db, event_id)
        .await
        .expect("pipeline never decided");
    assert_eq!(decision.outcome, "auto_matched");

    // Confirming on top of the active auto-match must conflict.
    let conflict = app
        .client
        .post(format!(
            "{}/api/payment-events/{}/review",
            app.base_url, event_id
        ))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&serde_json::json!({ "action": "confirm", "booking_id": booking_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(conflict.status(), 409);

    // Ignore, then confirm goes through as a manual match.
    let ignore = app
        .client
        .post(format!(
            "{}/api/payment-events/{}/review",
            app.base_url, event_id
        ))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&serde_json::json!({ "action": "ignore", "notes": "wrong booking" }))
        .send()
        .await
        .unwrap();
    assert_eq!(ignore.status(), 200);
    let ignored: serde_json::Value = ignore.json().await.unwrap();
    assert_eq!(ignored["payment_match"]["status"], "ignored");

    let confirm = app
        .client
        .post(format!(
            "{}/api/payment-events/{}/review",
            app.base_url, event_id
        ))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&serde_json::json!({ "action": "confirm", "booking_id": booking_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(confirm.status(), 200);

    assert_eq!(active_match_count(&app.db, event_id).await, 1);
}

#[tokio::test]
#[serial]
async fn ignore_without_active_match_is_not_found() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let response = app
        .client
        .post(format!("{}/api/payment-events", app.base_url))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&serde_json::json!({ "amount_cents": 31337, "method": "cash" }))
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = response.json().await.unwrap();
    let event_id: uuid::Uuid = serde_json::from_value(json["event"]["event_id"].clone()).unwrap();

    wait_for_decision(&app.db, event_id).await;

    let ignore = app
        .client
        .post(format!(
            "{}/api/payment-events/{}/review",
            app.base_url, event_id
        ))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&serde_json::json!({ "action": "ignore" }))
        .send()
        .await
        .unwrap();
    assert_eq!(ignore.status(), 404);
}

#[tokio::test]
#[serial]
async fn unknown_review_action_rejected() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let response = app
        .client
        .post(format!("{}/api/payment-events", app.base_url))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&serde_json::json!({ "amount_cents": 1000, "method": "cash" }))
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = response.json().await.unwrap();
    let event_id: uuid::Uuid = serde_json::from_value(json["event"]["event_id"].clone()).unwrap();

    let bad = app
        .client
        .post(format!(
            "{}/api/payment-events/{}/review",
            app.base_url, event_id
        ))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&serde_json::json!({ "action": "escalate" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);

    let event_detail = app
        .client
        .get(format!("{}/api/payment-events/{}", app.base_url, event_id))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(event_detail.status(), 200);
}
