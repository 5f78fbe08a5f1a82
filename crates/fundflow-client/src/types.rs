//! Request and response types for the fundflow API.

use serde::{Deserialize, Serialize};

use fundflow_core::{AllocationSource, Month, PageId, SessionId};

/// Allocation write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    /// The page.
    pub page_id: PageId,
    /// Signed change in cents.
    pub change_cents: i64,
    /// Monotonic per-page sequence within the session; the server ignores replays.
    pub client_sequence: u64,
    /// Session numbering `client_sequence`.
    pub session_id: Option<SessionId>,
    /// Where the write came from.
    pub source: AllocationSource,
}

/// Allocation write response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationWriteResponse {
    /// Always true; failures are error responses.
    pub success: bool,
    /// Page allocation after the write.
    pub current_allocation: i64,
    /// User's allocated total after the write.
    pub user_allocated_cents: i64,
    /// User's budget.
    pub total_budget_cents: i64,
    /// Highest client sequence applied to the page from this session.
    pub last_sequence: u64,
    /// Whether the write was a replay of an applied sequence.
    pub replayed: bool,
}

/// Budget response.
#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// One allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationResponse {
    /// The page.
    pub page_id: PageId,
    /// Allocated cents.
    pub allocation_cents: i64,
    /// Last change.
    pub updated_at: String,
}

/// List allocations response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAllocationsResponse {
    /// The open cycle.
    pub month: Month,
    /// Non-empty allocations.
    pub allocations: Vec<AllocationResponse>,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
