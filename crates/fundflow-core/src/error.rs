//! Error types for fundflow.

use crate::cycle::{CycleStatus, Month};
use crate::ids::IdError;

/// Result type for fundflow operations.
pub type Result<T> = std::result::Result<T, FundError>;

/// Errors that can occur in fundflow operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FundError {
    /// An allocation increase exceeds the remaining cycle budget.
    #[error("insufficient budget: remaining={remaining_cents}, requested={requested_cents}")]
    InsufficientBudget {
        /// Budget still unallocated in cents.
        remaining_cents: i64,
        /// Increase that was requested in cents.
        requested_cents: i64,
    },

    /// A change would drive a page allocation below zero.
    #[error("invalid allocation: current={current_cents}, change={change_cents}")]
    InvalidAllocation {
        /// Current page allocation in cents.
        current_cents: i64,
        /// Requested change in cents.
        change_cents: i64,
    },

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Group distribution shares are malformed.
    #[error("invalid group configuration: {0}")]
    InvalidGroupConfig(String),

    /// No open cycle accepts writes.
    #[error("no open cycle accepts allocations")]
    CycleNotOpen,

    /// The cycle does not exist.
    #[error("cycle not found: {month}")]
    CycleNotFound {
        /// The month that was not found.
        month: Month,
    },

    /// The cycle cannot move between the given states.
    #[error("invalid cycle transition for {month}: {from:?} -> {to:?}")]
    InvalidCycleTransition {
        /// The cycle month.
        month: Month,
        /// Current status.
        from: CycleStatus,
        /// Requested status.
        to: CycleStatus,
    },

    /// The user has no budget for the cycle.
    #[error("budget not found for user {user_id} in {month}")]
    BudgetNotFound {
        /// The user ID.
        user_id: String,
        /// The cycle month.
        month: Month,
    },

    /// Invalid month literal.
    #[error("invalid month: {0}")]
    InvalidMonth(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
