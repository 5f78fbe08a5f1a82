//! Engine and API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use fundflow_core::{FundError, Month, UserId};
use fundflow_store::StoreError;

use crate::stripe::StripeError;

/// Errors raised by the ledger, finalization, earnings and reconciliation
/// services.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain rule was violated.
    #[error(transparent)]
    Fund(#[from] FundError),

    /// The storage layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Finalization requested before the cycle deadline.
    #[error("cycle {month} is not due until {deadline_at}")]
    NotDue {
        /// The cycle.
        month: Month,
        /// When it becomes due.
        deadline_at: DateTime<Utc>,
    },

    /// Another cycle is already open.
    #[error("cycle {month} is already open")]
    CycleAlreadyOpen {
        /// The open cycle.
        month: Month,
    },

    /// A payout was requested for an ineligible writer.
    #[error("writer {writer_id} is not eligible for payout: {reason}")]
    PayoutNotEligible {
        /// The writer.
        writer_id: UserId,
        /// Why not.
        reason: String,
    },

    /// The payment processor could not be queried.
    #[error("payment processor error: {0}")]
    Processor(#[from] StripeError),
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Allocation increase exceeds the remaining budget.
    #[error("insufficient budget: remaining={remaining_cents}, requested={requested_cents}")]
    InsufficientBudget {
        /// Remaining budget.
        remaining_cents: i64,
        /// Requested increase.
        requested_cents: i64,
    },

    /// Allocation change would go below zero.
    #[error("invalid allocation: current={current_cents}, change={change_cents}")]
    InvalidAllocation {
        /// Current page allocation.
        current_cents: i64,
        /// Requested change.
        change_cents: i64,
    },

    /// Allocation writes are closed for the cycle.
    #[error("cycle not open")]
    CycleNotOpen,

    /// Payment processor not configured.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientBudget {
                remaining_cents,
                requested_cents,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_budget",
                self.to_string(),
                Some(serde_json::json!({
                    "remaining_cents": remaining_cents,
                    "requested_cents": requested_cents
                })),
            ),
            Self::InvalidAllocation {
                current_cents,
                change_cents,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_allocation",
                self.to_string(),
                Some(serde_json::json!({
                    "current_cents": current_cents,
                    "change_cents": change_cents
                })),
            ),
            Self::CycleNotOpen => (
                StatusCode::CONFLICT,
                "cycle_not_open",
                "Allocation writes are closed for this cycle".to_string(),
                None,
            ),
            Self::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
            StoreError::CorruptKey(cf) => Self::Internal(format!("corrupt key in {cf}")),
        }
    }
}

impl From<FundError> for ApiError {
    fn from(err: FundError) -> Self {
        match err {
            FundError::InsufficientBudget {
                remaining_cents,
                requested_cents,
            } => Self::InsufficientBudget {
                remaining_cents,
                requested_cents,
            },
            FundError::InvalidAllocation {
                current_cents,
                change_cents,
            } => Self::InvalidAllocation {
                current_cents,
                change_cents,
            },
            FundError::CycleNotOpen => Self::CycleNotOpen,
            FundError::CycleNotFound { .. } | FundError::BudgetNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            FundError::InvalidCycleTransition { .. } => Self::Conflict(err.to_string()),
            FundError::InvalidAmount(_)
            | FundError::InvalidGroupConfig(_)
            | FundError::InvalidMonth(_)
            | FundError::InvalidId(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Fund(e) => e.into(),
            EngineError::Store(e) => e.into(),
            EngineError::NotDue { .. }
            | EngineError::CycleAlreadyOpen { .. }
            | EngineError::PayoutNotEligible { .. } => Self::Conflict(err.to_string()),
            EngineError::Processor(e) => Self::ExternalService(e.to_string()),
        }
    }
}
