//! Allocation ledger.
//!
//! The only component that writes budgets and allocations. Every change is
//! validated against both the page allocation and the user's budget, then
//! committed together with a ledger entry in one atomic store write.
//!
//! # Locking
//!
//! - Changes for one user serialize on a per-user lock, because the user's
//!   budget row is shared by all of their pages. Different users proceed in
//!   parallel.
//! - A cycle gate is held shared by every write and exclusively while a
//!   cycle changes state, so no write can straddle the finalization
//!   snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, RwLock};

use fundflow_core::{
    Allocation, AllocationSource, CycleRecord, CycleStatus, FundError, LedgerEntry, LedgerEntryId,
    Month, PageId, SessionId, UserBudget, UserId,
};
use fundflow_store::Store;

use crate::error::EngineError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Lock table size at which idle user locks are first pruned.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Per-user write locks.
///
/// Idle entries are pruned when the table reaches `prune_at`, which then
/// doubles past the surviving entries, so pruning stays amortized O(1).
struct UserLocks {
    locks: HashMap<UserId, Arc<AsyncMutex<()>>>,
    prune_at: usize,
}

impl UserLocks {
    fn new() -> Self {
        Self {
            locks: HashMap::new(),
            prune_at: LOCK_PRUNE_THRESHOLD,
        }
    }

    fn get(&mut self, user_id: UserId) -> Arc<AsyncMutex<()>> {
        if self.locks.len() >= self.prune_at {
            self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            self.prune_at = (self.locks.len() * 2).max(LOCK_PRUNE_THRESHOLD);
        }
        Arc::clone(self.locks.entry(user_id).or_default())
    }
}

/// An allocation change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationWrite {
    /// The funding user.
    pub user_id: UserId,
    /// The funded page.
    pub page_id: PageId,
    /// Signed change in cents.
    pub change_cents: i64,
    /// Client-assigned monotonic sequence per page; 0 disables replay detection.
    pub client_sequence: u64,
    /// Session that numbered the write. Sessionless writers share one sequence.
    pub session_id: Option<SessionId>,
    /// Where the write originated.
    pub source: AllocationSource,
}

/// The state after an allocation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    /// The page.
    pub page_id: PageId,
    /// The cycle written to.
    pub month: Month,
    /// Page allocation after the change.
    pub page_allocation_cents: i64,
    /// User's allocated total after the change.
    pub user_allocated_cents: i64,
    /// User's budget.
    pub total_budget_cents: i64,
    /// Highest sequence applied to the page from the writing session.
    pub last_sequence: u64,
    /// Whether the write was a replay of an applied sequence.
    pub replayed: bool,
}

/// The allocation ledger.
pub struct AllocationLedger {
    store: Arc<dyn Store>,
    cycle_grace: Duration,
    user_locks: Mutex<UserLocks>,
    cycle_gate: RwLock<()>,
}

impl AllocationLedger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, cycle_grace: Duration) -> Self {
        Self {
            store,
            cycle_grace,
            user_locks: Mutex::new(UserLocks::new()),
            cycle_gate: RwLock::new(()),
        }
    }

    /// Lock handle for one user.
    fn user_lock(&self, user_id: UserId) -> Arc<AsyncMutex<()>> {
        self.user_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(user_id)
    }

    /// The cycle currently accepting writes.
    ///
    /// # Errors
    ///
    /// Returns `FundError::CycleNotOpen` if no cycle is open.
    pub fn open_cycle_record(&self) -> Result<CycleRecord> {
        self.store
            .list_cycles()?
            .into_iter()
            .rev()
            .find(|cycle| cycle.status == CycleStatus::Open)
            .ok_or(EngineError::Fund(FundError::CycleNotOpen))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply a signed change to a page allocation in the open cycle.
    ///
    /// A write whose sequence was already applied to the page is a replay:
    /// nothing changes and the current values are returned with
    /// `replayed = true`.
    ///
    /// # Errors
    ///
    /// - `FundError::CycleNotOpen` if no cycle accepts writes.
    /// - `FundError::BudgetNotFound` if the user has no budget for the cycle.
    /// - `FundError::InvalidAmount` for a zero change.
    /// - `FundError::InvalidAllocation` if the page would go below zero.
    /// - `FundError::InsufficientBudget` if the budget would be exceeded.
    pub async fn apply_delta(&self, write: AllocationWrite) -> Result<AllocationOutcome> {
        let _gate = self.cycle_gate.read().await;
        let cycle = self.open_cycle_record()?;
        let month = cycle.month;

        let lock = self.user_lock(write.user_id);
        let _guard = lock.lock().await;

        let mut budget = self
            .store
            .get_budget(&write.user_id, month)?
            .ok_or_else(|| FundError::BudgetNotFound {
                user_id: write.user_id.to_string(),
                month,
            })?;
        let mut allocation = self
            .store
            .get_allocation(&write.user_id, &write.page_id, month)?
            .unwrap_or_else(|| Allocation::new(write.user_id, write.page_id, month));

        if allocation.has_applied(write.session_id, write.client_sequence) {
            tracing::debug!(
                user_id = %write.user_id,
                page_id = %write.page_id,
                session_id = ?write.session_id,
                client_sequence = write.client_sequence,
                last_sequence = allocation.sequence_for(write.session_id),
                "Replayed allocation write ignored"
            );
            return Ok(outcome(&budget, &allocation, write.session_id, true));
        }

        if write.change_cents == 0 {
            return Err(FundError::InvalidAmount("change_cents must be non-zero".into()).into());
        }

        let page_after = allocation.checked_change(write.change_cents)?;
        let user_after = budget.checked_allocate(write.change_cents)?;

        let now = Utc::now();
        allocation.allocation_cents = page_after;
        allocation.record_sequence(write.session_id, write.client_sequence);
        allocation.updated_at = now;
        budget.allocated_cents = user_after;
        budget.updated_at = now;

        let entry = LedgerEntry {
            id: LedgerEntryId::generate(),
            user_id: write.user_id,
            page_id: write.page_id,
            month,
            change_cents: write.change_cents,
            client_sequence: write.client_sequence,
            session_id: write.session_id,
            source: write.source,
            page_allocation_after_cents: page_after,
            user_allocated_after_cents: user_after,
            created_at: now,
        };

        self.store.commit_allocation(&budget, &allocation, &entry)?;

        tracing::debug!(
            user_id = %write.user_id,
            page_id = %write.page_id,
            change_cents = write.change_cents,
            page_allocation_cents = page_after,
            user_allocated_cents = user_after,
            client_sequence = write.client_sequence,
            "Allocation committed"
        );

        Ok(outcome(&budget, &allocation, write.session_id, false))
    }

    /// Apply a new subscription amount to the user's open-cycle budget.
    ///
    /// Increases apply immediately. Decreases wait for the next cycle so a
    /// budget never drops below what is already allocated. A user with no
    /// budget yet gets one.
    ///
    /// Returns the budget after the update, or `None` if no cycle is open.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn refresh_budget(
        &self,
        user_id: UserId,
        amount_cents: i64,
    ) -> Result<Option<UserBudget>> {
        let _gate = self.cycle_gate.read().await;
        let cycle = match self.open_cycle_record() {
            Ok(cycle) => cycle,
            Err(EngineError::Fund(FundError::CycleNotOpen)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let budget = match self.store.get_budget(&user_id, cycle.month)? {
            Some(mut budget) if amount_cents > budget.total_budget_cents => {
                tracing::info!(
                    user_id = %user_id,
                    month = %cycle.month,
                    from_cents = budget.total_budget_cents,
                    to_cents = amount_cents,
                    "Budget increased"
                );
                budget.total_budget_cents = amount_cents;
                budget.updated_at = Utc::now();
                self.store.put_budget(&budget)?;
                budget
            }
            Some(budget) => {
                if amount_cents < budget.total_budget_cents {
                    tracing::debug!(
                        user_id = %user_id,
                        month = %cycle.month,
                        to_cents = amount_cents,
                        "Budget decrease deferred to next cycle"
                    );
                }
                budget
            }
            None => {
                let budget =
                    UserBudget::new(user_id, cycle.month, amount_cents.max(0), cycle.deadline_at);
                self.store.put_budget(&budget)?;
                tracing::info!(user_id = %user_id, month = %cycle.month, "Budget created");
                budget
            }
        };

        Ok(Some(budget))
    }

    // =========================================================================
    // Cycle transitions
    // =========================================================================

    /// Open a cycle, creating budgets from every funding subscription.
    ///
    /// Opening a cycle that already exists returns it unchanged, apart from
    /// inserting budgets for subscribers that have none yet.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CycleAlreadyOpen` if a different cycle is open.
    pub async fn open_cycle(&self, month: Month, now: DateTime<Utc>) -> Result<CycleRecord> {
        let _gate = self.cycle_gate.write().await;

        let cycles = self.store.list_cycles()?;
        if let Some(open) = cycles
            .iter()
            .find(|c| c.status == CycleStatus::Open && c.month != month)
        {
            return Err(EngineError::CycleAlreadyOpen { month: open.month });
        }

        let cycle = cycles
            .into_iter()
            .find(|c| c.month == month)
            .unwrap_or_else(|| CycleRecord::open(month, month.deadline(self.cycle_grace), now));

        let budgets: Vec<UserBudget> = self
            .store
            .list_subscriptions()?
            .iter()
            .filter(|sub| sub.funding_cents() > 0)
            .map(|sub| UserBudget::new(sub.user_id, month, sub.funding_cents(), cycle.deadline_at))
            .collect();

        let inserted = self.store.open_cycle(&cycle, &budgets)?;

        tracing::info!(
            month = %month,
            deadline_at = %cycle.deadline_at,
            budgets_created = inserted,
            "Cycle opened"
        );

        Ok(cycle)
    }

    /// Move an open cycle to `Closing`. Writes in flight finish first; later
    /// writes see no open cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the cycle does not exist or is not open.
    pub async fn begin_closing(&self, month: Month, now: DateTime<Utc>) -> Result<CycleRecord> {
        self.transition(month, CycleStatus::Closing, now).await
    }

    /// Move a closing cycle to `Closed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cycle does not exist or is not closing.
    pub async fn mark_closed(&self, month: Month, now: DateTime<Utc>) -> Result<CycleRecord> {
        self.transition(month, CycleStatus::Closed, now).await
    }

    async fn transition(
        &self,
        month: Month,
        to: CycleStatus,
        now: DateTime<Utc>,
    ) -> Result<CycleRecord> {
        let _gate = self.cycle_gate.write().await;
        let mut cycle = self
            .store
            .get_cycle(month)?
            .ok_or(FundError::CycleNotFound { month })?;
        cycle.transition(to, now)?;
        self.store.put_cycle(&cycle)?;
        tracing::info!(month = %month, status = ?to, "Cycle status changed");
        Ok(cycle)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The user's budget in the open cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if no cycle is open or the user has no budget.
    pub fn budget(&self, user_id: &UserId) -> Result<UserBudget> {
        let month = self.open_cycle_record()?.month;
        self.store
            .get_budget(user_id, month)?
            .ok_or_else(|| {
                FundError::BudgetNotFound {
                    user_id: user_id.to_string(),
                    month,
                }
                .into()
            })
    }

    /// The user's allocations in the open cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if no cycle is open or the store fails.
    pub fn allocations(&self, user_id: &UserId) -> Result<Vec<Allocation>> {
        let month = self.open_cycle_record()?.month;
        Ok(self.store.list_allocations_by_user(user_id, month)?)
    }

    /// One allocation in the open cycle; empty if never written.
    ///
    /// # Errors
    ///
    /// Returns an error if no cycle is open or the store fails.
    pub fn allocation(&self, user_id: &UserId, page_id: &PageId) -> Result<Allocation> {
        let month = self.open_cycle_record()?.month;
        Ok(self
            .store
            .get_allocation(user_id, page_id, month)?
            .unwrap_or_else(|| Allocation::new(*user_id, *page_id, month)))
    }

    /// The user's ledger entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn history(&self, user_id: &UserId, limit: usize, offset: usize) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.list_ledger_entries_by_user(user_id, limit, offset)?)
    }
}

fn outcome(
    budget: &UserBudget,
    allocation: &Allocation,
    session_id: Option<SessionId>,
    replayed: bool,
) -> AllocationOutcome {
    AllocationOutcome {
        page_id: allocation.page_id,
        month: allocation.month,
        page_allocation_cents: allocation.allocation_cents,
        user_allocated_cents: budget.allocated_cents,
        total_budget_cents: budget.total_budget_cents,
        last_sequence: allocation.sequence_for(session_id),
        replayed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundflow_core::{LocalSubscription, SubscriptionStatus};
    use fundflow_store::MemoryStore;

    fn month() -> Month {
        Month::new(2026, 5).unwrap()
    }

    async fn ledger_with_budget(user_id: UserId, budget_cents: i64) -> (AllocationLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .put_subscription(&LocalSubscription {
                user_id,
                amount_cents: budget_cents,
                status: SubscriptionStatus::Active,
                processor_subscription_id: None,
                updated_at: Utc::now(),
            })
            .unwrap();
        let ledger = AllocationLedger::new(store.clone(), Duration::zero());
        ledger.open_cycle(month(), Utc::now()).await.unwrap();
        (ledger, store)
    }

    fn write(user_id: UserId, page_id: PageId, change_cents: i64, client_sequence: u64) -> AllocationWrite {
        AllocationWrite {
            user_id,
            page_id,
            change_cents,
            client_sequence,
            session_id: None,
            source: AllocationSource::Batch,
        }
    }

    #[tokio::test]
    async fn over_budget_increase_is_rejected_without_changes() {
        let user = UserId::generate();
        let (x, y) = (PageId::generate(), PageId::generate());
        let (ledger, store) = ledger_with_budget(user, 1000).await;

        ledger.apply_delta(write(user, x, 300, 1)).await.unwrap();
        let after_y = ledger.apply_delta(write(user, y, 300, 1)).await.unwrap();
        assert_eq!(after_y.user_allocated_cents, 600);

        let err = ledger.apply_delta(write(user, x, 500, 2)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Fund(FundError::InsufficientBudget {
                remaining_cents: 400,
                requested_cents: 500
            })
        ));

        assert_eq!(store.get_allocation(&user, &x, month()).unwrap().unwrap().allocation_cents, 300);
        assert_eq!(store.get_budget(&user, month()).unwrap().unwrap().allocated_cents, 600);
    }

    #[tokio::test]
    async fn negative_result_is_rejected() {
        let user = UserId::generate();
        let page = PageId::generate();
        let (ledger, _store) = ledger_with_budget(user, 1000).await;

        ledger.apply_delta(write(user, page, 100, 1)).await.unwrap();
        let err = ledger.apply_delta(write(user, page, -150, 2)).await.unwrap_err();
        assert!(matches!(err, EngineError::Fund(FundError::InvalidAllocation { .. })));
        assert_eq!(ledger.allocation(&user, &page).unwrap().allocation_cents, 100);
    }

    #[tokio::test]
    async fn replayed_sequence_applies_once() {
        let user = UserId::generate();
        let page = PageId::generate();
        let (ledger, _store) = ledger_with_budget(user, 1000).await;

        let first = ledger.apply_delta(write(user, page, 200, 7)).await.unwrap();
        let replay = ledger.apply_delta(write(user, page, 200, 7)).await.unwrap();

        assert!(!first.replayed);
        assert!(replay.replayed);
        assert_eq!(replay.page_allocation_cents, 200);
        assert_eq!(ledger.budget(&user).unwrap().allocated_cents, 200);
        assert_eq!(ledger.history(&user, 10, 0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_writes_keep_budget_equal_to_sum_of_allocations() {
        let user = UserId::generate();
        let pages: Vec<PageId> = (0..5).map(|_| PageId::generate()).collect();
        let (ledger, store) = ledger_with_budget(user, 1000).await;
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for (i, page) in pages.iter().enumerate() {
            for seq in 1..=10_u64 {
                let ledger = Arc::clone(&ledger);
                let page = *page;
                handles.push(tokio::spawn(async move {
                    let _ = ledger
                        .apply_delta(write(user, page, 30, seq + (i as u64) * 100))
                        .await;
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let budget = store.get_budget(&user, month()).unwrap().unwrap();
        let sum: i64 = store
            .list_allocations_by_user(&user, month())
            .unwrap()
            .iter()
            .map(|a| a.allocation_cents)
            .sum();
        assert_eq!(budget.allocated_cents, sum);
        assert!(budget.allocated_cents <= budget.total_budget_cents);
    }

    #[tokio::test]
    async fn overflowing_change_is_rejected_without_changes() {
        let user = UserId::generate();
        let (page_a, page_b) = (PageId::generate(), PageId::generate());
        let (ledger, store) = ledger_with_budget(user, 1000).await;

        ledger.apply_delta(write(user, page_a, 1, 1)).await.unwrap();
        let err = ledger
            .apply_delta(write(user, page_b, i64::MAX, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Fund(FundError::InsufficientBudget { .. })));

        let err = ledger
            .apply_delta(write(user, page_a, i64::MIN, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Fund(FundError::InvalidAllocation { .. })));

        let budget = store.get_budget(&user, month()).unwrap().unwrap();
        assert_eq!(budget.allocated_cents, 1);
        assert_eq!(budget.total_budget_cents, 1000);
        assert!(store.get_allocation(&user, &page_b, month()).unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_with_overlapping_sequences_both_apply() {
        let user = UserId::generate();
        let page = PageId::generate();
        let (ledger, _store) = ledger_with_budget(user, 1000).await;
        let (first_tab, second_tab) = (SessionId::generate(), SessionId::generate());

        let first = ledger
            .apply_delta(AllocationWrite {
                session_id: Some(first_tab),
                ..write(user, page, 100, 2000)
            })
            .await
            .unwrap();
        let second = ledger
            .apply_delta(AllocationWrite {
                session_id: Some(second_tab),
                ..write(user, page, 200, 1995)
            })
            .await
            .unwrap();

        assert!(!first.replayed);
        assert!(!second.replayed);
        assert_eq!(second.page_allocation_cents, 300);
        assert_eq!(second.user_allocated_cents, 300);
        assert_eq!(second.last_sequence, 1995);

        let retry = ledger
            .apply_delta(AllocationWrite {
                session_id: Some(second_tab),
                ..write(user, page, 200, 1995)
            })
            .await
            .unwrap();
        assert!(retry.replayed);
        assert_eq!(ledger.budget(&user).unwrap().allocated_cents, 300);
    }

    #[test]
    fn idle_user_locks_are_pruned_past_threshold() {
        let mut locks = UserLocks::new();
        let held = locks.get(UserId::generate());
        for _ in 0..LOCK_PRUNE_THRESHOLD {
            locks.get(UserId::generate());
        }

        assert!(locks.locks.len() <= 2);
        assert!(locks.locks.values().any(|lock| Arc::ptr_eq(lock, &held)));
        assert_eq!(locks.prune_at, LOCK_PRUNE_THRESHOLD);
    }

    #[tokio::test]
    async fn writes_rejected_once_closing() {
        let user = UserId::generate();
        let (ledger, _store) = ledger_with_budget(user, 1000).await;

        ledger.begin_closing(month(), Utc::now()).await.unwrap();
        let err = ledger
            .apply_delta(write(user, PageId::generate(), 100, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Fund(FundError::CycleNotOpen)));
    }

    #[tokio::test]
    async fn refresh_budget_applies_increases_and_defers_decreases() {
        let user = UserId::generate();
        let (ledger, _store) = ledger_with_budget(user, 1000).await;

        let raised = ledger.refresh_budget(user, 1500).await.unwrap().unwrap();
        assert_eq!(raised.total_budget_cents, 1500);

        let kept = ledger.refresh_budget(user, 500).await.unwrap().unwrap();
        assert_eq!(kept.total_budget_cents, 1500);

        let newcomer = UserId::generate();
        let created = ledger.refresh_budget(newcomer, 800).await.unwrap().unwrap();
        assert_eq!(created.total_budget_cents, 800);
    }

    #[tokio::test]
    async fn only_one_cycle_may_be_open() {
        let (ledger, _store) = ledger_with_budget(UserId::generate(), 1000).await;
        let err = ledger.open_cycle(month().next(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, EngineError::CycleAlreadyOpen { .. }));
        assert!(ledger.open_cycle(month(), Utc::now()).await.is_ok());
    }
}
