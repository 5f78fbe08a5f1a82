//! Allocation batcher.
//!
//! Rapid allocation changes to the same page are coalesced into a single
//! signed write. Each page has its own debounce timer and its own FIFO
//! queue of writes, drained by one task at a time, so writes for a page
//! reach the server in order while different pages proceed concurrently.
//!
//! Every batcher is one client session with its own [`SessionId`]. Each
//! write carries the session id and a per-page `client_sequence` counted
//! from 1 within the session. Retries reuse the sequence, so a retry of a
//! write the server already applied is answered as a replay instead of
//! being applied twice.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use fundflow_core::{AllocationSource, PageId, SessionId};

use crate::error::{AllocationError, ClientError};
use crate::state::{AllocationStateStore, StateEvent};
use crate::types::{
    AllocationRequest, AllocationWriteResponse, BudgetResponse, ListAllocationsResponse,
};

/// Sends allocation writes to the server.
#[async_trait]
pub trait AllocationWriter: Send + Sync + 'static {
    /// Apply one signed allocation change.
    async fn write_allocation(
        &self,
        request: AllocationRequest,
    ) -> Result<AllocationWriteResponse, ClientError>;
}

#[async_trait]
impl<W: AllocationWriter> AllocationWriter for Arc<W> {
    async fn write_allocation(
        &self,
        request: AllocationRequest,
    ) -> Result<AllocationWriteResponse, ClientError> {
        W::write_allocation(self, request).await
    }
}

/// How urgently a change should be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Debounced and coalesced with later changes.
    #[default]
    Normal,
    /// Written immediately, together with anything pending for the page.
    High,
}

/// Batcher tuning.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Quiet period after the last change before a page is written.
    pub debounce: Duration,
    /// Retries of a write after a retryable failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry.
    pub initial_backoff: Duration,
    /// Upper bound on the retry delay.
    pub max_backoff: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Result of a change once the server answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationConfirmation {
    /// The page.
    pub page_id: PageId,
    /// Page allocation after the write that carried the change.
    pub allocation_cents: i64,
    /// Sequence of that write; `None` when changes cancelled out and nothing was sent.
    pub client_sequence: Option<u64>,
}

type Outcome = Result<AllocationConfirmation, AllocationError>;

/// Resolves when the write carrying a change is answered.
#[derive(Debug)]
pub struct ChangeHandle {
    rx: oneshot::Receiver<Outcome>,
}

impl ChangeHandle {
    fn resolved(outcome: Outcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }
}

impl Future for ChangeHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(AllocationError::Dropped)))
    }
}

/// A write taken off the pending total, waiting its turn.
struct Flush {
    change_cents: i64,
    client_sequence: u64,
    source: AllocationSource,
    waiters: Vec<oneshot::Sender<Outcome>>,
}

struct PageQueue {
    pending_cents: i64,
    pending_waiters: Vec<oneshot::Sender<Outcome>>,
    generation: u64,
    /// Pending, queued and in-flight change not yet answered.
    outstanding_cents: i64,
    next_sequence: u64,
    writes: VecDeque<Flush>,
    draining: bool,
}

impl PageQueue {
    fn new() -> Self {
        Self {
            pending_cents: 0,
            pending_waiters: Vec::new(),
            generation: 0,
            outstanding_cents: 0,
            next_sequence: 1,
            writes: VecDeque::new(),
            draining: false,
        }
    }
}

struct Shared<W> {
    writer: W,
    config: BatcherConfig,
    session_id: SessionId,
    state: Arc<AllocationStateStore>,
    pages: Mutex<HashMap<PageId, PageQueue>>,
}

/// Coalesces allocation changes per page and writes them in order.
///
/// Must be used from within a Tokio runtime.
pub struct AllocationBatcher<W> {
    shared: Arc<Shared<W>>,
}

impl<W> Clone for AllocationBatcher<W> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<W: AllocationWriter> AllocationBatcher<W> {
    /// Create a batcher with default tuning.
    pub fn new(writer: W, state: Arc<AllocationStateStore>) -> Self {
        Self::with_config(writer, state, BatcherConfig::default())
    }

    /// Create a batcher with custom tuning.
    pub fn with_config(writer: W, state: Arc<AllocationStateStore>, config: BatcherConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                writer,
                config,
                session_id: SessionId::generate(),
                state,
                pages: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The session this batcher numbers its writes in.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.shared.session_id
    }

    /// The state store this batcher updates.
    #[must_use]
    pub fn state(&self) -> &Arc<AllocationStateStore> {
        &self.shared.state
    }

    /// Request a signed change to a page's allocation.
    ///
    /// The change is shown optimistically at once. Normal changes are
    /// written after the debounce period; high-priority changes are written
    /// immediately along with anything pending for the page.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::OutOfFunds`] without queueing anything when
    /// an increase exceeds the displayed remaining budget.
    pub fn request_change(
        &self,
        page_id: PageId,
        change_cents: i64,
        priority: Priority,
    ) -> Result<ChangeHandle, AllocationError> {
        if change_cents == 0 {
            return Ok(ChangeHandle::resolved(Ok(AllocationConfirmation {
                page_id,
                allocation_cents: self.shared.state.page(&page_id).displayed_cents(),
                client_sequence: None,
            })));
        }

        let (tx, rx) = oneshot::channel();
        let mut pages = self.shared.lock_pages();
        self.shared.state.check_change(change_cents)?;

        let queue = pages.entry(page_id).or_insert_with(PageQueue::new);
        queue.pending_cents += change_cents;
        queue.outstanding_cents += change_cents;
        queue.pending_waiters.push(tx);
        queue.generation += 1;
        let generation = queue.generation;
        self.shared.state.apply(
            page_id,
            StateEvent::RequestIssued {
                outstanding_cents: queue.outstanding_cents,
            },
        );

        match priority {
            Priority::High => {
                self.shared.flush(&mut pages, page_id, AllocationSource::Direct);
            }
            Priority::Normal => {
                drop(pages);
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    tokio::time::sleep(shared.config.debounce).await;
                    shared.flush_if_current(page_id, generation);
                });
            }
        }

        Ok(ChangeHandle { rx })
    }

    /// Write everything pending now, skipping the debounce.
    pub fn flush_all(&self) {
        let mut pages = self.shared.lock_pages();
        let waiting: Vec<PageId> = pages
            .iter()
            .filter(|(_, queue)| !queue.pending_waiters.is_empty())
            .map(|(page_id, _)| *page_id)
            .collect();
        for page_id in waiting {
            self.shared.flush(&mut pages, page_id, AllocationSource::Batch);
        }
    }

    /// Change not yet written for a page.
    #[must_use]
    pub fn pending_cents(&self, page_id: &PageId) -> i64 {
        self.shared
            .lock_pages()
            .get(page_id)
            .map_or(0, |queue| queue.pending_cents)
    }

    /// Adopt the server's value for a page.
    ///
    /// The displayed value is replaced only when nothing is outstanding for
    /// the page.
    pub fn sync_page(&self, page_id: PageId, allocation_cents: i64) {
        let mut pages = self.shared.lock_pages();
        let queue = pages.entry(page_id).or_insert_with(PageQueue::new);
        if queue.outstanding_cents == 0 {
            self.shared.state.apply(
                page_id,
                StateEvent::Refreshed {
                    confirmed_cents: allocation_cents,
                },
            );
        }
    }

    /// Adopt a full server snapshot of the funder's budget and allocations.
    pub fn load(&self, budget: &BudgetResponse, allocations: &ListAllocationsResponse) {
        self.shared.state.set_total_budget(budget.total_budget_cents);
        for allocation in &allocations.allocations {
            self.sync_page(allocation.page_id, allocation.allocation_cents);
        }
    }
}

impl<W: AllocationWriter> Shared<W> {
    fn lock_pages(&self) -> MutexGuard<'_, HashMap<PageId, PageQueue>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush_if_current(self: &Arc<Self>, page_id: PageId, generation: u64) {
        let mut pages = self.lock_pages();
        let current = pages
            .get(&page_id)
            .is_some_and(|queue| queue.generation == generation);
        if current {
            self.flush(&mut pages, page_id, AllocationSource::Batch);
        }
    }

    /// Move the pending change of a page into its write queue.
    fn flush(
        self: &Arc<Self>,
        pages: &mut HashMap<PageId, PageQueue>,
        page_id: PageId,
        source: AllocationSource,
    ) {
        let Some(queue) = pages.get_mut(&page_id) else {
            return;
        };
        if queue.pending_waiters.is_empty() {
            return;
        }

        let change_cents = std::mem::take(&mut queue.pending_cents);
        let waiters = std::mem::take(&mut queue.pending_waiters);

        if change_cents == 0 {
            if queue.outstanding_cents == 0 && queue.writes.is_empty() && !queue.draining {
                let confirmed_cents = self.state.page(&page_id).confirmed_cents;
                self.state.apply(
                    page_id,
                    StateEvent::ServerConfirmed {
                        confirmed_cents,
                        outstanding_cents: 0,
                    },
                );
            }
            let confirmation = AllocationConfirmation {
                page_id,
                allocation_cents: self.state.page(&page_id).displayed_cents(),
                client_sequence: None,
            };
            for waiter in waiters {
                let _ = waiter.send(Ok(confirmation));
            }
            return;
        }

        let client_sequence = queue.next_sequence;
        queue.next_sequence += 1;
        queue.writes.push_back(Flush {
            change_cents,
            client_sequence,
            source,
            waiters,
        });
        debug!(
            %page_id,
            session_id = %self.session_id,
            change_cents,
            client_sequence,
            "Allocation write queued"
        );

        if !queue.draining {
            queue.draining = true;
            let shared = Arc::clone(self);
            tokio::spawn(async move { shared.drain(page_id).await });
        }
    }

    /// Send a page's queued writes one at a time until the queue is empty.
    async fn drain(self: Arc<Self>, page_id: PageId) {
        loop {
            let Some(flush) = self.next_write(page_id) else {
                return;
            };
            self.state.apply(page_id, StateEvent::WriteStarted);
            let result = self.send(page_id, &flush).await;
            self.settle(page_id, flush, result);
        }
    }

    fn next_write(&self, page_id: PageId) -> Option<Flush> {
        let mut pages = self.lock_pages();
        let queue = pages.get_mut(&page_id)?;
        let next = queue.writes.pop_front();
        if next.is_none() {
            queue.draining = false;
        }
        next
    }

    async fn send(
        &self,
        page_id: PageId,
        flush: &Flush,
    ) -> Result<AllocationWriteResponse, ClientError> {
        let request = AllocationRequest {
            page_id,
            change_cents: flush.change_cents,
            client_sequence: flush.client_sequence,
            session_id: Some(self.session_id),
            source: flush.source,
        };
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0;

        loop {
            match self.writer.write_allocation(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!(
                        %page_id,
                        attempt,
                        error = %e,
                        "Retrying allocation write"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn settle(
        &self,
        page_id: PageId,
        flush: Flush,
        result: Result<AllocationWriteResponse, ClientError>,
    ) {
        let mut pages = self.lock_pages();
        let outstanding_cents = match pages.get_mut(&page_id) {
            Some(queue) => {
                queue.outstanding_cents -= flush.change_cents;
                if let Ok(response) = &result {
                    queue.next_sequence = queue
                        .next_sequence
                        .max(response.last_sequence.saturating_add(1));
                }
                queue.outstanding_cents
            }
            None => 0,
        };

        match result {
            Ok(response) => {
                self.state.set_total_budget(response.total_budget_cents);
                self.state.apply(
                    page_id,
                    StateEvent::ServerConfirmed {
                        confirmed_cents: response.current_allocation,
                        outstanding_cents,
                    },
                );
                let confirmation = AllocationConfirmation {
                    page_id,
                    allocation_cents: response.current_allocation,
                    client_sequence: Some(flush.client_sequence),
                };
                for waiter in flush.waiters {
                    let _ = waiter.send(Ok(confirmation));
                }
            }
            Err(e) => {
                warn!(
                    %page_id,
                    change_cents = flush.change_cents,
                    error = %e,
                    "Allocation write failed, rolling back"
                );
                self.state.apply(
                    page_id,
                    StateEvent::ServerRejected {
                        error: e.to_string(),
                        outstanding_cents,
                    },
                );
                let error = AllocationError::Write(Arc::new(e));
                for waiter in flush.waiters {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
        }
    }
}
