//! Optimistic per-page allocation state.
//!
//! The store keeps, for every page the funder touched, the last value the
//! server confirmed and an optional optimistic value covering changes that
//! are still in flight. Views read [`PageAllocationState::displayed_cents`]
//! and listen on [`AllocationStateStore::subscribe`] for page updates.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use fundflow_core::PageId;

use crate::error::AllocationError;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Where a page's value stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Never touched in this session.
    #[default]
    Idle,
    /// Local changes not yet confirmed.
    Optimistic,
    /// Displayed value equals the server's.
    Confirmed,
    /// The last write failed and was rolled back.
    Error,
}

/// Allocation state of one page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageAllocationState {
    /// Last server-confirmed allocation.
    pub confirmed_cents: i64,
    /// Locally predicted allocation while changes are in flight.
    pub optimistic_cents: Option<i64>,
    /// Current phase.
    pub phase: Phase,
    /// Message of the last failed write.
    pub error: Option<String>,
    /// Whether a write for the page is in flight.
    pub is_loading: bool,
    /// When the state last changed.
    pub last_updated: Option<DateTime<Utc>>,
}

impl PageAllocationState {
    /// The value to show: optimistic if present, else confirmed.
    #[must_use]
    pub fn displayed_cents(&self) -> i64 {
        self.optimistic_cents.unwrap_or(self.confirmed_cents)
    }
}

/// Discrete transitions of a page's state.
///
/// `outstanding_cents` is the sum of changes the server has not yet
/// answered for the page, counting queued and in-flight writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// A change was requested locally.
    RequestIssued {
        /// Unanswered changes including this one.
        outstanding_cents: i64,
    },
    /// A write for the page was sent.
    WriteStarted,
    /// The server applied a write.
    ServerConfirmed {
        /// Authoritative page allocation.
        confirmed_cents: i64,
        /// Changes still unanswered.
        outstanding_cents: i64,
    },
    /// The server rejected a write; its change is rolled back.
    ServerRejected {
        /// Rejection message.
        error: String,
        /// Changes still unanswered.
        outstanding_cents: i64,
    },
    /// Server state was reloaded; local predictions are discarded.
    Refreshed {
        /// Authoritative page allocation.
        confirmed_cents: i64,
    },
}

impl PageAllocationState {
    fn apply(&mut self, event: StateEvent, now: DateTime<Utc>) {
        match event {
            StateEvent::RequestIssued { outstanding_cents } => {
                self.optimistic_cents = Some(self.confirmed_cents + outstanding_cents);
                self.phase = Phase::Optimistic;
                self.error = None;
            }
            StateEvent::WriteStarted => {
                self.is_loading = true;
            }
            StateEvent::ServerConfirmed {
                confirmed_cents,
                outstanding_cents,
            } => {
                self.confirmed_cents = confirmed_cents;
                self.is_loading = false;
                if outstanding_cents == 0 {
                    self.optimistic_cents = None;
                    self.phase = Phase::Confirmed;
                } else {
                    self.optimistic_cents = Some(confirmed_cents + outstanding_cents);
                    self.phase = Phase::Optimistic;
                }
            }
            StateEvent::ServerRejected {
                error,
                outstanding_cents,
            } => {
                self.is_loading = false;
                self.optimistic_cents =
                    (outstanding_cents != 0).then_some(self.confirmed_cents + outstanding_cents);
                self.phase = Phase::Error;
                self.error = Some(error);
            }
            StateEvent::Refreshed { confirmed_cents } => {
                self.confirmed_cents = confirmed_cents;
                self.optimistic_cents = None;
                self.phase = Phase::Confirmed;
                self.error = None;
                self.is_loading = false;
            }
        }
        self.last_updated = Some(now);
    }
}

#[derive(Debug, Default)]
struct Inner {
    pages: HashMap<PageId, PageAllocationState>,
    total_budget_cents: i64,
}

/// Shared optimistic allocation state for one funder.
#[derive(Debug)]
pub struct AllocationStateStore {
    inner: Mutex<Inner>,
    updates: broadcast::Sender<PageId>,
}

impl Default for AllocationStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            updates,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive the ID of every page whose state changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PageId> {
        self.updates.subscribe()
    }

    /// Current state of a page.
    #[must_use]
    pub fn page(&self, page_id: &PageId) -> PageAllocationState {
        self.lock().pages.get(page_id).cloned().unwrap_or_default()
    }

    /// Apply a transition to a page and notify subscribers.
    pub fn apply(&self, page_id: PageId, event: StateEvent) {
        {
            let mut inner = self.lock();
            inner
                .pages
                .entry(page_id)
                .or_default()
                .apply(event, Utc::now());
        }
        // No receivers is fine.
        let _ = self.updates.send(page_id);
    }

    /// Set the funder's total budget.
    pub fn set_total_budget(&self, total_budget_cents: i64) {
        self.lock().total_budget_cents = total_budget_cents;
    }

    /// Total budget as last reported by the server.
    #[must_use]
    pub fn total_budget_cents(&self) -> i64 {
        self.lock().total_budget_cents
    }

    /// Budget left after every displayed allocation.
    #[must_use]
    pub fn remaining_budget_cents(&self) -> i64 {
        let inner = self.lock();
        let displayed: i64 = inner
            .pages
            .values()
            .map(PageAllocationState::displayed_cents)
            .sum();
        inner.total_budget_cents - displayed
    }

    /// Refuse an increase the displayed budget cannot cover.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::OutOfFunds`] when `change_cents` is positive
    /// and exceeds the remaining budget.
    pub fn check_change(&self, change_cents: i64) -> Result<(), AllocationError> {
        if change_cents <= 0 {
            return Ok(());
        }
        let remaining_cents = self.remaining_budget_cents();
        if change_cents > remaining_cents {
            return Err(AllocationError::OutOfFunds {
                remaining_cents,
                requested_cents: change_cents,
            });
        }
        Ok(())
    }

    /// Replace local state with server values.
    pub fn load(
        &self,
        total_budget_cents: i64,
        allocations: impl IntoIterator<Item = (PageId, i64)>,
    ) {
        self.set_total_budget(total_budget_cents);
        for (page_id, cents) in allocations {
            self.apply(
                page_id,
                StateEvent::Refreshed {
                    confirmed_cents: cents,
                },
            );
        }
    }
}
