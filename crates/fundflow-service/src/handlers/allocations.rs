//! Budget and allocation handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use fundflow_core::{
    format_cents, Allocation, AllocationSource, LedgerEntry, Month, PageId, SessionId,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::AllocationWrite;
use crate::state::AppState;

/// Budget response.
#[derive(Debug, Serialize)]
pub struct BudgetResponse {
    /// The open cycle.
    pub month: Month,
    /// Total budget in cents.
    pub total_budget_cents: i64,
    /// Allocated across all pages.
    pub allocated_cents: i64,
    /// Still available to allocate.
    pub remaining_cents: i64,
    /// Remaining budget formatted as dollars.
    pub remaining_formatted: String,
    /// When the cycle is finalized.
    pub deadline_at: String,
}

/// Get the caller's budget for the open cycle.
pub async fn get_budget(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BudgetResponse>, ApiError> {
    let budget = state.ledger.budget(&auth.user_id)?;

    Ok(Json(BudgetResponse {
        month: budget.month,
        total_budget_cents: budget.total_budget_cents,
        allocated_cents: budget.allocated_cents,
        remaining_cents: budget.remaining_cents(),
        remaining_formatted: format_cents(budget.remaining_cents()),
        deadline_at: budget.deadline_at.to_rfc3339(),
    }))
}

/// Allocation response.
#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    /// The page.
    pub page_id: PageId,
    /// Allocated cents.
    pub allocation_cents: i64,
    /// Last change.
    pub updated_at: String,
}

impl From<&Allocation> for AllocationResponse {
    fn from(allocation: &Allocation) -> Self {
        Self {
            page_id: allocation.page_id,
            allocation_cents: allocation.allocation_cents,
            updated_at: allocation.updated_at.to_rfc3339(),
        }
    }
}

/// List allocations response.
#[derive(Debug, Serialize)]
pub struct ListAllocationsResponse {
    /// The open cycle.
    pub month: Month,
    /// Non-empty allocations of the caller.
    pub allocations: Vec<AllocationResponse>,
}

/// List the caller's allocations for the open cycle.
pub async fn list_allocations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListAllocationsResponse>, ApiError> {
    let month = state.ledger.open_cycle_record()?.month;
    let allocations = state
        .ledger
        .allocations(&auth.user_id)?
        .iter()
        .filter(|a| a.allocation_cents > 0)
        .map(AllocationResponse::from)
        .collect();

    Ok(Json(ListAllocationsResponse { month, allocations }))
}

/// Get one allocation.
pub async fn get_allocation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(page_id): Path<String>,
) -> Result<Json<AllocationResponse>, ApiError> {
    let page_id: PageId = page_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid page ID".into()))?;

    let allocation = state.ledger.allocation(&auth.user_id, &page_id)?;
    Ok(Json(AllocationResponse::from(&allocation)))
}

/// Allocation write request.
#[derive(Debug, Deserialize)]
pub struct AllocationRequest {
    /// The page.
    pub page_id: PageId,
    /// Signed change in cents.
    pub change_cents: i64,
    /// Client sequence for replay detection (0 disables it).
    #[serde(default)]
    pub client_sequence: u64,
    /// Session numbering `client_sequence`; writes without one share a sequence.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Where the write came from (default: api).
    #[serde(default = "default_source")]
    pub source: AllocationSource,
}

fn default_source() -> AllocationSource {
    AllocationSource::Api
}

/// Allocation write response.
#[derive(Debug, Serialize)]
pub struct AllocationWriteResponse {
    /// Always true; failures are error responses.
    pub success: bool,
    /// Page allocation after the write.
    pub current_allocation: i64,
    /// Caller's allocated total after the write.
    pub user_allocated_cents: i64,
    /// Caller's budget.
    pub total_budget_cents: i64,
    /// Highest client sequence applied to the page from this session.
    pub last_sequence: u64,
    /// Whether this was a replay of an applied write.
    pub replayed: bool,
}

/// Apply an allocation change.
pub async fn write_allocation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<AllocationRequest>,
) -> Result<Json<AllocationWriteResponse>, ApiError> {
    let outcome = state
        .ledger
        .apply_delta(AllocationWrite {
            user_id: auth.user_id,
            page_id: req.page_id,
            change_cents: req.change_cents,
            client_sequence: req.client_sequence,
            session_id: req.session_id,
            source: req.source,
        })
        .await?;

    Ok(Json(AllocationWriteResponse {
        success: true,
        current_allocation: outcome.page_allocation_cents,
        user_allocated_cents: outcome.user_allocated_cents,
        total_budget_cents: outcome.total_budget_cents,
        last_sequence: outcome.last_sequence,
        replayed: outcome.replayed,
    }))
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of entries to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// History response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Ledger entries (newest first).
    pub entries: Vec<LedgerEntry>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List the caller's allocation history.
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let mut entries = state
        .ledger
        .history(&auth.user_id, limit + 1, query.offset)?;

    let has_more = entries.len() > limit;
    entries.truncate(limit);

    Ok(Json(HistoryResponse { entries, has_more }))
}
