//! Budget and allocation integration tests.

mod common;

use axum::http::StatusCode;
use common::{past_month, TestHarness};
use fundflow_core::{PageId, SessionId, UserId};
use fundflow_store::Store;
use serde_json::json;

async fn funded_harness(budget_cents: i64) -> TestHarness {
    let harness = TestHarness::new();
    harness.seed_subscription(harness.test_user_id, budget_cents);
    harness.open_cycle(past_month()).await;
    harness
}

// ============================================================================
// Budget
// ============================================================================

#[tokio::test]
async fn get_budget_success() {
    let harness = funded_harness(1000).await;

    let response = harness
        .as_user(harness.server.get("/v1/budget"), harness.test_user_id)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["month"], "2020-01");
    assert_eq!(body["total_budget_cents"], 1000);
    assert_eq!(body["remaining_cents"], 1000);
    assert_eq!(body["remaining_formatted"], "$10.00");
}

#[tokio::test]
async fn get_budget_without_subscription_is_not_found() {
    let harness = funded_harness(1000).await;

    let response = harness
        .as_user(harness.server.get("/v1/budget"), UserId::generate())
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn get_budget_without_auth_fails() {
    let harness = funded_harness(1000).await;

    let response = harness.server.get("/v1/budget").await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Allocation writes
// ============================================================================

#[tokio::test]
async fn over_budget_allocation_is_rejected_and_nothing_changes() {
    let harness = funded_harness(1000).await;
    let user = harness.test_user_id;
    let (page_x, page_y) = (PageId::generate(), PageId::generate());

    harness.allocate(user, page_x, 300, 1).await.assert_status_ok();
    let response = harness.allocate(user, page_y, 300, 1).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["user_allocated_cents"], 600);

    let response = harness.allocate(user, page_x, 500, 2).await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_budget");
    assert_eq!(body["error"]["details"]["remaining_cents"], 400);

    let response = harness
        .as_user(
            harness.server.get(&format!("/v1/allocations/{page_x}")),
            user,
        )
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["allocation_cents"], 300);

    let budget = harness
        .store
        .get_budget(&user, past_month())
        .unwrap()
        .unwrap();
    assert_eq!(budget.allocated_cents, 600);
}

#[tokio::test]
async fn decrease_below_zero_is_rejected() {
    let harness = funded_harness(1000).await;
    let page = PageId::generate();

    harness
        .allocate(harness.test_user_id, page, 100, 1)
        .await
        .assert_status_ok();

    let response = harness.allocate(harness.test_user_id, page, -200, 2).await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_allocation");
}

#[tokio::test]
async fn zero_change_is_bad_request() {
    let harness = funded_harness(1000).await;

    let response = harness
        .allocate(harness.test_user_id, PageId::generate(), 0, 1)
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn replayed_sequence_is_applied_once() {
    let harness = funded_harness(1000).await;
    let page = PageId::generate();

    let first = harness.allocate(harness.test_user_id, page, 250, 42).await;
    first.assert_status_ok();
    let replay = harness.allocate(harness.test_user_id, page, 250, 42).await;
    replay.assert_status_ok();

    let body: serde_json::Value = replay.json();
    assert_eq!(body["replayed"], true);
    assert_eq!(body["current_allocation"], 250);
    assert_eq!(body["user_allocated_cents"], 250);
}

#[tokio::test]
async fn overflowing_change_is_rejected() {
    let harness = funded_harness(1000).await;
    let user = harness.test_user_id;
    let (page_a, page_b) = (PageId::generate(), PageId::generate());

    harness.allocate(user, page_a, 1, 1).await.assert_status_ok();
    let response = harness.allocate(user, page_b, i64::MAX, 1).await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);

    let budget = harness
        .store
        .get_budget(&user, past_month())
        .unwrap()
        .unwrap();
    assert_eq!(budget.allocated_cents, 1);
}

#[tokio::test]
async fn writes_from_two_sessions_both_apply() {
    let harness = funded_harness(1000).await;
    let user = harness.test_user_id;
    let page = PageId::generate();

    for (session, change, seq) in [
        (SessionId::generate(), 100, 2000),
        (SessionId::generate(), 200, 1995),
    ] {
        let response = harness
            .as_user(harness.server.post("/v1/allocations"), user)
            .json(&json!({
                "page_id": page,
                "change_cents": change,
                "client_sequence": seq,
                "session_id": session,
                "source": "batch"
            }))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["replayed"], false);
    }

    let body: serde_json::Value = harness
        .as_user(harness.server.get(&format!("/v1/allocations/{page}")), user)
        .await
        .json();
    assert_eq!(body["allocation_cents"], 300);
}

#[tokio::test]
async fn allocation_without_open_cycle_conflicts() {
    let harness = TestHarness::new();
    harness.seed_subscription(harness.test_user_id, 1000);

    let response = harness
        .allocate(harness.test_user_id, PageId::generate(), 100, 1)
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "cycle_not_open");
}

#[tokio::test]
async fn allocated_total_matches_sum_of_allocations() {
    let harness = funded_harness(1000).await;
    let user = harness.test_user_id;
    let pages: Vec<PageId> = (0..4).map(|_| PageId::generate()).collect();

    for (i, page) in pages.iter().enumerate() {
        let cents = i64::try_from(i + 1).unwrap() * 100;
        harness.allocate(user, *page, cents, 1).await.assert_status_ok();
    }
    harness.allocate(user, pages[3], -150, 2).await.assert_status_ok();

    let response = harness
        .as_user(harness.server.get("/v1/allocations"), user)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let sum: i64 = body["allocations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["allocation_cents"].as_i64().unwrap())
        .sum();

    let budget: serde_json::Value = harness
        .as_user(harness.server.get("/v1/budget"), user)
        .await
        .json();
    assert_eq!(sum, 850);
    assert_eq!(budget["allocated_cents"], sum);
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn history_is_newest_first_and_paginated() {
    let harness = funded_harness(1000).await;
    let page = PageId::generate();

    for seq in 1..=3 {
        harness
            .allocate(harness.test_user_id, page, 10 * i64::try_from(seq).unwrap(), seq)
            .await
            .assert_status_ok();
    }

    let response = harness
        .as_user(
            harness.server.get("/v1/allocations/history?limit=2"),
            harness.test_user_id,
        )
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(body["has_more"], true);
    assert_eq!(entries[0]["change_cents"], 30);
    assert_eq!(entries[0]["page_allocation_after_cents"], 60);
}
