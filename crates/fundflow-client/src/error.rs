//! Client error types.

use std::sync::Arc;

/// Errors that can occur when using the fundflow client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

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

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, rate limiting and server errors are retryable;
    /// validation failures are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_decode() && !e.is_builder(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::InsufficientBudget { .. }
            | Self::InvalidAllocation { .. }
            | Self::CycleNotOpen
            | Self::Serialization(_)
            | Self::Configuration(_) => false,
        }
    }
}

/// Errors surfaced by the allocation batcher to a caller awaiting a change.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AllocationError {
    /// The increase exceeds the remaining budget; nothing was sent.
    #[error("out of funds: remaining={remaining_cents}, requested={requested_cents}")]
    OutOfFunds {
        /// Remaining budget as displayed.
        remaining_cents: i64,
        /// Requested increase.
        requested_cents: i64,
    },

    /// The write failed after any retries; the optimistic value was rolled back.
    #[error("allocation write failed: {0}")]
    Write(Arc<ClientError>),

    /// The batcher shut down before the change resolved.
    #[error("allocation batcher dropped the change")]
    Dropped,
}
