//! Stripe integration.
//!
//! Stripe is the payment processor and the ground truth for subscription
//! amounts. The service reads:
//! - Subscriptions, paginated, for reconciliation
//! - Subscription webhooks, to keep local records current

pub mod client;
pub mod types;

pub use client::{verify_webhook_signature, StripeClient, StripeError};
pub use types::*;
