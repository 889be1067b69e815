//! Integration tests for webhook ingestion and ledger idempotency.

mod common;

use common::*;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn stripe_redelivery_creates_exactly_one_event() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let provider_event_id = format!("evt_{}", uuid::Uuid::new_v4().simple());
    let body = stripe_charge_body(&provider_event_id, 99990, Some("deposit"), None, None, None);
    let header = stripe_signature(&body, STRIPE_TEST_SECRET);

    let first = app
        .client
        .post(format!("{}/webhooks/stripe/webhook", app.base_url))
        .header("stripe-signature", &header)
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let first_json: serde_json::Value = first.json().await.unwrap();
    assert_eq!(first_json["status"], "processed");
    assert_eq!(first_json["duplicate"], false);

    let second = app
        .client
        .post(format!("{}/webhooks/stripe/webhook", app.base_url))
        .header("stripe-signature", &header)
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    let second_json: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second_json["duplicate"], true);
    assert_eq!(second_json["event_id"], first_json["event_id"]);

    assert_eq!(event_count(&app.db, "stripe", &provider_event_id).await, 1);

    // No bookings are seeded, so the decision is unmatched and no match row
    // appears no matter how many times the webhook is delivered.
    let event_id: uuid::Uuid =
        serde_json::from_value(first_json["event_id"].clone()).unwrap();
    let decision = wait_for_decision(&app.db, event_id).await.unwrap();
    assert_eq!(decision.outcome, "unmatched");
    assert_eq!(active_match_count(&app.db, event_id).await, 0);
}

#[tokio::test]
#[serial]
async fn stripe_invalid_signature_rejected() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let provider_event_id = format!("evt_{}", uuid::Uuid::new_v4().simple());
    let body = stripe_charge_body(&provider_event_id, 12300, None, None, None, None);
    let header = stripe_signature(&body, "whsec_wrong_secret");

    let response = app
        .client
        .post(format!("{}/webhooks/stripe/webhook", app.base_url))
        .header("stripe-signature", &header)
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(event_count(&app.db, "stripe", &provider_event_id).await, 0);
}

#[tokio::test]
#[serial]
async fn stripe_missing_signature_rejected() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let body = stripe_charge_body("evt_no_sig", 12300, None, None, None, None);
    let response = app
        .client
        .post(format!("{}/webhooks/stripe/webhook", app.base_url))
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[serial]
async fn stripe_unrecognized_event_acked_without_side_effects() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let body = serde_json::json!({
        "id": "evt_unrecognized",
        "type": "customer.created",
        "created": chrono::Utc::now().timestamp(),
        "data": { "object": { "id": "cus_1", "object": "customer", "currency": "usd", "created": 0 } }
    })
    .to_string();
    let header = stripe_signature(&body, STRIPE_TEST_SECRET);

    let response = app
        .client
        .post(format!("{}/webhooks/stripe/webhook", app.base_url))
        .header("stripe-signature", &header)
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["status"], "processed");
    assert_eq!(json["type"], "customer.created");
    assert_eq!(event_count(&app.db, "stripe", "evt_unrecognized").await, 0);
}

#[tokio::test]
#[serial]
async fn plaid_deposit_ingested() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let transaction_id = format!("txn_{}", uuid::Uuid::new_v4().simple());
    let body = serde_json::json!({
        "webhook_type": "TRANSACTIONS",
        "webhook_code": "DEFAULT_UPDATE",
        "item_id": "item_test",
        "transaction": {
            "transaction_id": transaction_id,
            "amount": -321.50,
            "iso_currency_code": "USD",
            "date": chrono::Utc::now().date_naive(),
            "name": "ZELLE FROM TEST SENDER",
            "merchant_name": null
        }
    })
    .to_string();

    let response = app
        .client
        .post(format!("{}/webhooks/plaid/webhook", app.base_url))
        .header("plaid-signature", plaid_signature(&body, PLAID_TEST_SECRET))
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["duplicate"], false);
    assert_eq!(event_count(&app.db, "plaid", &transaction_id).await, 1);
}

#[tokio::test]
#[serial]
async fn plaid_bad_signature_rejected() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let body = r#"{"webhook_type":"TRANSACTIONS","webhook_code":"DEFAULT_UPDATE"}"#;
    let response = app
        .client
        .post(format!("{}/webhooks/plaid/webhook", app.base_url))
        .header("plaid-signature", "deadbeef")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[serial]
async fn manual_entry_requires_admin_token() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let payload = serde_json::json!({
        "amount_cents": 45000,
        "method": "zelle",
        "memo": "manual test"
    });

    let unauthenticated = app
        .client
        .post(format!("{}/api/payment-events", app.base_url))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(unauthenticated.status(), 401);

    let wrong_token = app
        .client
        .post(format!("{}/api/payment-events", app.base_url))
        .bearer_auth("not-the-token")
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_token.status(), 403);

    let authenticated = app
        .client
        .post(format!("{}/api/payment-events", app.base_url))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(authenticated.status(), 201);

    let json: serde_json::Value = authenticated.json().await.unwrap();
    assert_eq!(json["event"]["provider"], "manual");
    assert_eq!(json["event"]["amount_cents"], 45000);
}

#[tokio::test]
#[serial]
async fn manual_entry_validates_amount() {
    if !db_available() {
        return;
    }
    let app = spawn_app().await;

    let response = app
        .client
        .post(format!("{}/api/payment-events", app.base_url))
        .bearer_auth(ADMIN_TEST_TOKEN)
        .json(&serde_json::json!({
            "amount_cents": 0,
            "method": "cash"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 422);
}
