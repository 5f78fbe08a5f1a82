//! Writer earnings handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use fundflow_core::{BankAccountStatus, UserId, WriterAccount};

use crate::auth::ServiceAuth;
use crate::earnings::WriterEarningsView;
use crate::error::ApiError;
use crate::state::AppState;

fn parse_writer_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid writer ID".into()))
}

/// Bank status request.
#[derive(Debug, Deserialize)]
pub struct BankStatusRequest {
    /// New verification state.
    pub status: BankAccountStatus,
}

/// Set a writer's bank account status.
pub async fn set_bank_status(
    State(state): State<Arc<AppState>>,
    _service: ServiceAuth,
    Path(writer_id): Path<String>,
    Json(req): Json<BankStatusRequest>,
) -> Result<Json<WriterAccount>, ApiError> {
    let writer_id = parse_writer_id(&writer_id)?;
    let account = state.earnings.set_bank_status(writer_id, req.status).await?;
    Ok(Json(account))
}

/// Get a writer's balance, monthly records and payout eligibility.
pub async fn get_writer_earnings(
    State(state): State<Arc<AppState>>,
    _service: ServiceAuth,
    Path(writer_id): Path<String>,
) -> Result<Json<WriterEarningsView>, ApiError> {
    let writer_id = parse_writer_id(&writer_id)?;
    Ok(Json(state.earnings.writer_earnings(writer_id, Utc::now())?))
}
