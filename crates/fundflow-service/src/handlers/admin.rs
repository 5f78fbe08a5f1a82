//! Admin handlers: cycle control, reporting, payouts and reconciliation.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use fundflow_core::{
    CycleRecord, EarningsSummary, Month, MonthlyTotals, ReconciliationReport, SyncResult, UserId,
    WriterEarningsRecord,
};

use crate::auth::AdminAuth;
use crate::earnings::PayoutReceipt;
use crate::error::ApiError;
use crate::finalization::FinalizationReport;
use crate::reconciliation::ReconciliationEngine;
use crate::state::AppState;

fn parse_month(raw: &str) -> Result<Month, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid month: {raw}")))
}

// ============================================================================
// Cycles
// ============================================================================

/// Open cycle request.
#[derive(Debug, Deserialize)]
pub struct OpenCycleRequest {
    /// Month to open (default: the current month).
    pub month: Option<String>,
}

/// Open a cycle. Used once to bootstrap; finalization opens the rest.
pub async fn open_cycle(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(req): Json<OpenCycleRequest>,
) -> Result<Json<CycleRecord>, ApiError> {
    let now = Utc::now();
    let month = match req.month.as_deref() {
        Some(raw) => parse_month(raw)?,
        None => Month::containing(now),
    };

    tracing::info!(admin_id = %admin.admin_id, month = %month, "Opening cycle");
    Ok(Json(state.ledger.open_cycle(month, now).await?))
}

/// Finalize request.
#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    /// Month to finalize (default: the open cycle).
    pub month: Option<String>,
    /// Skip the deadline check.
    #[serde(default)]
    pub force: bool,
}

/// Finalize a cycle.
pub async fn finalize(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(req): Json<FinalizeRequest>,
) -> Result<Json<FinalizationReport>, ApiError> {
    let month = match req.month.as_deref() {
        Some(raw) => parse_month(raw)?,
        None => state.ledger.open_cycle_record()?.month,
    };

    tracing::info!(
        admin_id = %admin.admin_id,
        month = %month,
        force = req.force,
        "Finalization requested"
    );

    Ok(Json(
        state.finalization.finalize(month, req.force, Utc::now()).await?,
    ))
}

// ============================================================================
// Reporting
// ============================================================================

/// One closed month with its writer earnings.
#[derive(Debug, Serialize)]
pub struct MonthHistory {
    /// Platform totals.
    pub totals: MonthlyTotals,
    /// Per-writer earnings, ordered by writer.
    pub writer_earnings: Vec<WriterEarningsRecord>,
}

/// History response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Closed months, oldest first.
    pub months: Vec<MonthHistory>,
}

/// Monthly totals plus writer detail for every closed cycle.
pub async fn history(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<HistoryResponse>, ApiError> {
    let mut months = Vec::new();
    for totals in state.store.list_monthly_totals()? {
        let writer_earnings = state.store.list_earnings_by_month(totals.month)?;
        months.push(MonthHistory {
            totals,
            writer_earnings,
        });
    }
    Ok(Json(HistoryResponse { months }))
}

/// Aggregate earnings summary.
pub async fn earnings_summary(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<EarningsSummary>, ApiError> {
    Ok(Json(state.earnings.summary(Utc::now())?))
}

/// Mature response.
#[derive(Debug, Serialize)]
pub struct MatureResponse {
    /// Records promoted to available.
    pub matured: usize,
}

/// Promote earnings whose hold has ended.
pub async fn mature_earnings(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<MatureResponse>, ApiError> {
    let matured = state.earnings.mature(Utc::now()).await?;
    Ok(Json(MatureResponse { matured }))
}

/// Record a payout of a writer's available earnings.
pub async fn record_payout(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(writer_id): Path<String>,
) -> Result<Json<PayoutReceipt>, ApiError> {
    let writer_id: UserId = writer_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid writer ID".into()))?;

    tracing::info!(admin_id = %admin.admin_id, writer_id = %writer_id, "Payout requested");
    Ok(Json(state.earnings.record_payout(writer_id, Utc::now()).await?))
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Reconciliation query parameters.
#[derive(Debug, Deserialize)]
pub struct ReconciliationQuery {
    /// Month the report is labelled with (default: the current month).
    pub month: Option<String>,
}

fn reconciliation_month(raw: Option<&str>) -> Result<Month, ApiError> {
    raw.map_or_else(|| Ok(Month::containing(Utc::now())), parse_month)
}

fn engine(state: &AppState) -> Result<&Arc<ReconciliationEngine>, ApiError> {
    state
        .reconciliation
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Payment processor not configured".into()))
}

/// Compare local subscriptions against the payment processor.
pub async fn reconciliation_report(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<ReconciliationQuery>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    let month = reconciliation_month(query.month.as_deref())?;
    Ok(Json(engine(&state)?.check(month).await?))
}

/// Sync response.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// The report the corrections were derived from.
    pub report: ReconciliationReport,
    /// What was corrected.
    pub result: SyncResult,
}

/// Correct local subscriptions to match the payment processor.
pub async fn reconciliation_sync(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Query(query): Query<ReconciliationQuery>,
) -> Result<Json<SyncResponse>, ApiError> {
    let month = reconciliation_month(query.month.as_deref())?;
    tracing::info!(admin_id = %admin.admin_id, month = %month, "Reconciliation sync requested");

    let (report, result) = engine(&state)?.sync(month).await?;
    Ok(Json(SyncResponse { report, result }))
}
