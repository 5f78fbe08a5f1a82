//! Finalization, group distribution and earnings integration tests.

mod common;

use axum::http::StatusCode;
use common::{past_month, TestHarness};
use fundflow_core::{CycleStatus, GroupId, PageId, UserId};
use fundflow_store::Store;
use serde_json::json;

async fn finalize(harness: &TestHarness, force: bool) -> serde_json::Value {
    let response = harness
        .as_admin(harness.server.post("/v1/admin/finalize"))
        .json(&json!({ "month": past_month().to_string(), "force": force }))
        .await;
    response.assert_status_ok();
    response.json()
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn finalization_splits_fee_and_unallocated_revenue() {
    let harness = TestHarness::new();
    let funder = harness.test_user_id;
    let writer = UserId::generate();

    harness.seed_subscription(funder, 1000);
    harness.open_cycle(past_month()).await;
    let page = harness.register_writer_page(writer).await;
    harness.allocate(funder, page, 700, 1).await.assert_status_ok();

    let report = finalize(&harness, false).await;
    assert_eq!(report["totals"]["total_allocated_cents"], 700);
    assert_eq!(report["totals"]["platform_fee_cents"], 70);
    assert_eq!(report["totals"]["creator_payouts_cents"], 630);
    assert_eq!(report["totals"]["total_unallocated_cents"], 300);
    assert_eq!(report["totals"]["platform_revenue_cents"], 370);
    assert_eq!(report["next_month"], "2020-02");

    let response = harness
        .as_service(harness.server.get(&format!("/v1/writers/{writer}/earnings")))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["records"][0]["gross_earnings_cents"], 700);
    assert_eq!(body["records"][0]["net_payout_cents"], 630);
    assert_eq!(body["balance"]["pending_earnings_cents"], 630);
    assert_eq!(body["payout_eligible"], false);
}

#[tokio::test]
async fn group_earnings_are_split_by_largest_remainder() {
    let harness = TestHarness::new();
    let funder = harness.test_user_id;
    let (a, b, c) = (UserId::generate(), UserId::generate(), UserId::generate());
    let group_id = GroupId::generate();
    let page_id = PageId::generate();

    harness.seed_subscription(funder, 1000);
    harness.open_cycle(past_month()).await;

    harness
        .as_service(
            harness
                .server
                .put(&format!("/v1/groups/{group_id}/distribution")),
        )
        .json(&json!({ "members": [
            { "member_id": a, "percentage": 60 },
            { "member_id": b, "percentage": 30 },
            { "member_id": c, "percentage": 10 }
        ] }))
        .await
        .assert_status_ok();
    harness
        .as_service(harness.server.post("/v1/pages"))
        .json(&json!({
            "page_id": page_id,
            "owner": { "type": "group", "group_id": group_id }
        }))
        .await
        .assert_status_ok();

    harness.allocate(funder, page_id, 101, 1).await.assert_status_ok();
    let report = finalize(&harness, false).await;
    assert_eq!(report["group_count"], 1);
    assert_eq!(report["writer_count"], 3);

    let gross = |writer: UserId| {
        harness
            .store
            .list_writer_earnings(&writer)
            .unwrap()
            .first()
            .map(|r| r.gross_earnings_cents)
            .unwrap()
    };
    assert_eq!(gross(a), 61);
    assert_eq!(gross(b), 30);
    assert_eq!(gross(c), 10);
}

#[tokio::test]
async fn group_shares_must_sum_to_one_hundred() {
    let harness = TestHarness::new();
    let group_id = GroupId::generate();

    let response = harness
        .as_service(
            harness
                .server
                .put(&format!("/v1/groups/{group_id}/distribution")),
        )
        .json(&json!({ "members": [
            { "member_id": UserId::generate(), "percentage": 60 },
            { "member_id": UserId::generate(), "percentage": 30 }
        ] }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn oversized_group_shares_are_rejected() {
    let harness = TestHarness::new();
    let group_id = GroupId::generate();

    let response = harness
        .as_service(
            harness
                .server
                .put(&format!("/v1/groups/{group_id}/distribution")),
        )
        .json(&json!({ "members": [
            { "member_id": UserId::generate(), "percentage": u32::MAX },
            { "member_id": UserId::generate(), "percentage": 101 }
        ] }))
        .await;

    response.assert_status_bad_request();
}

// ============================================================================
// Cycle lifecycle
// ============================================================================

#[tokio::test]
async fn rerunning_a_closed_cycle_is_a_no_op() {
    let harness = TestHarness::new();
    let writer = UserId::generate();
    harness.seed_subscription(harness.test_user_id, 1000);
    harness.open_cycle(past_month()).await;
    let page = harness.register_writer_page(writer).await;
    harness
        .allocate(harness.test_user_id, page, 400, 1)
        .await
        .assert_status_ok();

    let first = finalize(&harness, false).await;
    let second = finalize(&harness, false).await;

    assert_eq!(second["already_closed"], true);
    assert_eq!(first["totals"], second["totals"]);
    assert_eq!(
        harness
            .store
            .list_earnings_by_month(past_month())
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        harness.store.get_cycle(past_month()).unwrap().unwrap().status,
        CycleStatus::Closed
    );
}

#[tokio::test]
async fn next_cycle_starts_with_fresh_budget() {
    let harness = TestHarness::new();
    harness.seed_subscription(harness.test_user_id, 1000);
    harness.open_cycle(past_month()).await;
    harness
        .allocate(harness.test_user_id, PageId::generate(), 900, 1)
        .await
        .assert_status_ok();

    finalize(&harness, false).await;

    let response = harness
        .as_user(harness.server.get("/v1/budget"), harness.test_user_id)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["month"], "2020-02");
    assert_eq!(body["allocated_cents"], 0);
    assert_eq!(body["total_budget_cents"], 1000);
}

#[tokio::test]
async fn opening_a_second_cycle_conflicts() {
    let harness = TestHarness::new();
    harness.open_cycle(past_month()).await;

    let response = harness
        .as_admin(harness.server.post("/v1/admin/cycles"))
        .json(&json!({ "month": "2020-03" }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn finalize_requires_admin_key() {
    let harness = TestHarness::new();
    harness.open_cycle(past_month()).await;

    let response = harness
        .server
        .post("/v1/admin/finalize")
        .json(&json!({}))
        .await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Reporting and payouts
// ============================================================================

#[tokio::test]
async fn history_lists_closed_months_with_writer_detail() {
    let harness = TestHarness::new();
    let writer = UserId::generate();
    harness.seed_subscription(harness.test_user_id, 1000);
    harness.open_cycle(past_month()).await;
    let page = harness.register_writer_page(writer).await;
    harness
        .allocate(harness.test_user_id, page, 500, 1)
        .await
        .assert_status_ok();
    finalize(&harness, false).await;

    let response = harness
        .as_admin(harness.server.get("/v1/admin/history"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let months = body["months"].as_array().unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0]["totals"]["month"], "2020-01");
    assert_eq!(months[0]["writer_earnings"][0]["net_payout_cents"], 450);
}

#[tokio::test]
async fn payout_pays_matured_earnings_of_verified_writer() {
    let harness = TestHarness::new();
    let writer = UserId::generate();
    harness.seed_subscription(harness.test_user_id, 5000);
    harness.open_cycle(past_month()).await;
    let page = harness.register_writer_page(writer).await;
    harness
        .allocate(harness.test_user_id, page, 5000, 1)
        .await
        .assert_status_ok();
    finalize(&harness, false).await;

    // Settlement hold starts when the cycle closed, so nothing is payable yet.
    harness
        .as_service(harness.server.put(&format!("/v1/writers/{writer}/bank-status")))
        .json(&json!({ "status": "verified" }))
        .await
        .assert_status_ok();
    let response = harness
        .as_admin(harness.server.post(&format!("/v1/admin/writers/{writer}/payout")))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let summary: serde_json::Value = harness
        .as_admin(harness.server.get("/v1/admin/earnings/summary"))
        .await
        .json();
    assert_eq!(summary["total_net_cents"], 4500);
    assert_eq!(summary["total_pending_cents"], 4500);
    assert_eq!(summary["eligible_writer_count"], 1);
}
