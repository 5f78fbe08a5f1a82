//! Fundflow HTTP API Service.
//!
//! This crate provides the authoritative side of the fund distribution
//! engine:
//!
//! - The allocation ledger, the only writer of budgets and allocations
//! - Monthly finalization into writer earnings and platform totals
//! - Writer earnings, maturation and payouts
//! - Reconciliation of local subscriptions against Stripe
//!
//! # Authentication
//!
//! 1. **Gateway user headers** - `X-User-Id` plus the service API key, for
//!    end-user requests already authenticated upstream
//! 2. **Service API keys** - For the content service
//! 3. **Admin API keys** - For finalization, reporting and reconciliation

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for the router

pub mod auth;
pub mod config;
pub mod crypto;
pub mod earnings;
pub mod error;
pub mod finalization;
pub mod handlers;
pub mod ledger;
pub mod reconciliation;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use earnings::{EarningsAggregator, PayoutReceipt, WriterEarningsView};
pub use error::{ApiError, EngineError};
pub use finalization::{FinalizationJob, FinalizationReport};
pub use ledger::{AllocationLedger, AllocationOutcome, AllocationWrite};
pub use reconciliation::{PaymentProcessor, ReconciliationEngine};
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
