//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, allocations, health, pages, webhooks, writers};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for allocation endpoints.
/// Batched clients write often, so these get the larger share.
const ALLOCATION_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Budget and allocations (user auth)
/// - `GET /v1/budget` - Budget for the open cycle
/// - `GET /v1/allocations` - Allocations for the open cycle
/// - `POST /v1/allocations` - Apply an allocation change
/// - `GET /v1/allocations/history` - Ledger entries
/// - `GET /v1/allocations/:page_id` - One allocation
///
/// ## Content collaborator (Service API Key auth)
/// - `POST /v1/pages` - Register page owner
/// - `PUT /v1/groups/:group_id/distribution` - Set group split
/// - `PUT /v1/writers/:writer_id/bank-status` - Set bank account status
/// - `GET /v1/writers/:writer_id/earnings` - Writer earnings
///
/// ## Admin (Admin API Key auth)
/// - `POST /v1/admin/cycles` - Open a cycle
/// - `POST /v1/admin/finalize` - Finalize a cycle
/// - `GET /v1/admin/history` - Monthly totals with writer detail
/// - `GET /v1/admin/earnings/summary` - Earnings summary
/// - `POST /v1/admin/earnings/mature` - Promote matured earnings
/// - `POST /v1/admin/writers/:writer_id/payout` - Record a payout
/// - `GET /v1/admin/reconciliation` - Reconciliation report
/// - `POST /v1/admin/reconciliation/sync` - Apply corrections
///
/// ## Webhooks (Signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let allocation_routes = Router::new()
        .route(
            "/",
            get(allocations::list_allocations).post(allocations::write_allocation),
        )
        .route("/history", get(allocations::list_history))
        .route("/:page_id", get(allocations::get_allocation))
        .layer(ConcurrencyLimitLayer::new(ALLOCATION_MAX_CONCURRENT_REQUESTS));

    let admin_routes = Router::new()
        .route("/cycles", post(admin::open_cycle))
        .route("/finalize", post(admin::finalize))
        .route("/history", get(admin::history))
        .route("/earnings/summary", get(admin::earnings_summary))
        .route("/earnings/mature", post(admin::mature_earnings))
        .route("/writers/:writer_id/payout", post(admin::record_payout))
        .route("/reconciliation", get(admin::reconciliation_report))
        .route("/reconciliation/sync", post(admin::reconciliation_sync));

    let api_routes = Router::new()
        .route("/budget", get(allocations::get_budget))
        .nest("/allocations", allocation_routes)
        // Content collaborator
        .route("/pages", post(pages::register_page))
        .route(
            "/groups/:group_id/distribution",
            put(pages::set_group_distribution),
        )
        .route("/writers/:writer_id/bank-status", put(writers::set_bank_status))
        .route("/writers/:writer_id/earnings", get(writers::get_writer_earnings))
        .nest("/admin", admin_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by Stripe)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
