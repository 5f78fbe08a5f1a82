//! Fundflow Client SDK.
//!
//! This crate provides the funder-facing side of fundflow: an HTTP client for
//! the allocation API, an optimistic per-page state store, and a batcher
//! that coalesces rapid allocation changes into ordered, idempotent writes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fundflow_client::{AllocationBatcher, AllocationStateStore, FundflowClient, Priority};
//! use fundflow_core::{PageId, UserId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FundflowClient::new(
//!     "http://fundflow.billing-system.svc:8080",
//!     "your-service-api-key",
//! )?
//! .for_user(UserId::generate());
//!
//! let state = Arc::new(AllocationStateStore::new());
//! let batcher = AllocationBatcher::new(client.clone(), Arc::clone(&state));
//! batcher.load(&client.get_budget().await?, &client.list_allocations().await?);
//!
//! // Shown at once, written after the debounce period.
//! let page = PageId::generate();
//! let handle = batcher.request_change(page, 100, Priority::Normal)?;
//! println!("Showing {} cents", state.page(&page).displayed_cents());
//!
//! let confirmation = handle.await?;
//! println!("Server total: {} cents", confirmation.allocation_cents);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod batcher;
mod client;
mod error;
mod state;
mod types;

pub use batcher::{
    AllocationBatcher, AllocationConfirmation, AllocationWriter, BatcherConfig, ChangeHandle,
    Priority,
};
pub use client::{ClientOptions, FundflowClient, UserClient};
pub use error::{AllocationError, ClientError};
pub use state::{AllocationStateStore, PageAllocationState, Phase, StateEvent};
pub use types::*;
