//! Reconciliation and webhook integration tests.

mod common;

use axum::http::StatusCode;
use common::{past_month, TestHarness};
use fundflow_core::{ProcessorSubscription, SubscriptionStatus, UserId};
use fundflow_store::Store;
use serde_json::json;

fn remote(user_id: UserId, amount_cents: i64, status: SubscriptionStatus) -> ProcessorSubscription {
    ProcessorSubscription {
        user_id,
        subscription_id: format!("sub_{user_id}"),
        status,
        amount_cents,
    }
}

#[tokio::test]
async fn stale_local_subscription_is_zeroed_by_sync() {
    let harness = TestHarness::new();
    let user = harness.test_user_id;
    harness.seed_subscription(user, 500);
    harness
        .processor
        .set(vec![remote(user, 0, SubscriptionStatus::Cancelled)]);

    let response = harness
        .as_admin(harness.server.get("/v1/admin/reconciliation"))
        .await;
    response.assert_status_ok();
    let report: serde_json::Value = response.json();
    assert_eq!(report["is_in_sync"], false);
    assert_eq!(report["discrepancies"][0]["type"], "stale_local");
    assert_eq!(report["discrepancies"][0]["local_amount_cents"], 500);
    assert_eq!(report["discrepancies"][0]["processor_amount_cents"], 0);

    let response = harness
        .as_admin(harness.server.post("/v1/admin/reconciliation/sync"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["result"]["stale_records_fixed"], 1);
    assert_eq!(body["result"]["errors"].as_array().unwrap().len(), 0);

    let local = harness.store.get_subscription(&user).unwrap().unwrap();
    assert_eq!(local.funding_cents(), 0);

    let report: serde_json::Value = harness
        .as_admin(harness.server.get("/v1/admin/reconciliation"))
        .await
        .json();
    assert_eq!(report["is_in_sync"], true);
}

#[tokio::test]
async fn amount_mismatch_takes_processor_value_and_raises_budget() {
    let harness = TestHarness::new();
    let user = harness.test_user_id;
    harness.seed_subscription(user, 1000);
    harness.open_cycle(past_month()).await;
    harness
        .processor
        .set(vec![remote(user, 1500, SubscriptionStatus::Active)]);

    let body: serde_json::Value = harness
        .as_admin(harness.server.post("/v1/admin/reconciliation/sync"))
        .await
        .json();
    assert_eq!(body["result"]["amount_mismatches_fixed"], 1);

    let budget: serde_json::Value = harness
        .as_user(harness.server.get("/v1/budget"), user)
        .await
        .json();
    assert_eq!(budget["total_budget_cents"], 1500);
}

#[tokio::test]
async fn missing_local_is_flagged_not_created() {
    let harness = TestHarness::new();
    let stranger = UserId::generate();
    harness
        .processor
        .set(vec![remote(stranger, 2000, SubscriptionStatus::Active)]);

    let body: serde_json::Value = harness
        .as_admin(harness.server.post("/v1/admin/reconciliation/sync"))
        .await
        .json();
    assert_eq!(body["result"]["missing_local_flagged"], 1);
    assert_eq!(body["report"]["processor_total_cents"], 2000);
    assert!(harness.store.get_subscription(&stranger).unwrap().is_none());
}

#[tokio::test]
async fn reconciliation_without_processor_is_unavailable() {
    let harness = TestHarness::without_processor();

    let response = harness
        .as_admin(harness.server.get("/v1/admin/reconciliation"))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Webhooks
// ============================================================================

fn subscription_event(event_type: &str, user_id: UserId, amount: i64, status: &str) -> serde_json::Value {
    json!({
        "id": "evt_test",
        "type": event_type,
        "data": { "object": {
            "id": "sub_123",
            "status": status,
            "metadata": { "user_id": user_id.to_string() },
            "items": { "data": [
                { "id": "si_1", "price": { "id": "price_1", "unit_amount": amount }, "quantity": 1 }
            ] }
        } }
    })
}

#[tokio::test]
async fn subscription_webhook_records_subscription_and_funds_budget() {
    let harness = TestHarness::new();
    let user = harness.test_user_id;
    harness.open_cycle(past_month()).await;

    harness
        .server
        .post("/webhooks/stripe")
        .json(&subscription_event("customer.subscription.created", user, 1200, "active"))
        .await
        .assert_status_ok();

    let local = harness.store.get_subscription(&user).unwrap().unwrap();
    assert_eq!(local.amount_cents, 1200);
    assert_eq!(local.processor_subscription_id.as_deref(), Some("sub_123"));

    let budget: serde_json::Value = harness
        .as_user(harness.server.get("/v1/budget"), user)
        .await
        .json();
    assert_eq!(budget["total_budget_cents"], 1200);
}

#[tokio::test]
async fn deleted_subscription_webhook_cancels_locally() {
    let harness = TestHarness::new();
    let user = harness.test_user_id;
    harness.seed_subscription(user, 1000);

    harness
        .server
        .post("/webhooks/stripe")
        .json(&subscription_event("customer.subscription.deleted", user, 1000, "active"))
        .await
        .assert_status_ok();

    let local = harness.store.get_subscription(&user).unwrap().unwrap();
    assert_eq!(local.status, SubscriptionStatus::Cancelled);
    assert_eq!(local.funding_cents(), 0);
}
