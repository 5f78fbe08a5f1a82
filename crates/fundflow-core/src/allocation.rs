//! Budget and allocation types.
//!
//! A user's monthly budget is divided among pages. The ledger keeps three
//! records in step: the per-cycle [`UserBudget`], one [`Allocation`] per
//! `(user, page)`, and an append-only [`LedgerEntry`] per committed change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::Month;
use crate::error::{FundError, Result};
use crate::ids::{GroupId, LedgerEntryId, PageId, SessionId, UserId};

/// A user's budget for one cycle.
///
/// Invariant: `0 <= allocated_cents <= total_budget_cents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBudget {
    /// The funding user.
    pub user_id: UserId,

    /// The cycle this budget belongs to.
    pub month: Month,

    /// Total cents the user may allocate this cycle.
    pub total_budget_cents: i64,

    /// Cents currently allocated across all pages.
    pub allocated_cents: i64,

    /// When the cycle is finalized.
    pub deadline_at: DateTime<Utc>,

    /// When the budget was last changed.
    pub updated_at: DateTime<Utc>,
}

impl UserBudget {
    /// Create an empty budget for a cycle.
    #[must_use]
    pub fn new(
        user_id: UserId,
        month: Month,
        total_budget_cents: i64,
        deadline_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            month,
            total_budget_cents,
            allocated_cents: 0,
            deadline_at,
            updated_at: Utc::now(),
        }
    }

    /// Cents still available to allocate.
    #[must_use]
    pub const fn remaining_cents(&self) -> i64 {
        self.total_budget_cents - self.allocated_cents
    }

    /// Check a change against the budget and return the new allocated total.
    ///
    /// Decreases always pass the budget check; the page-level check rejects
    /// changes that would go below zero.
    ///
    /// # Errors
    ///
    /// Returns `FundError::InsufficientBudget` if a positive change exceeds
    /// the remaining budget, or `FundError::InvalidAmount` if the total
    /// cannot be represented.
    pub fn checked_allocate(&self, change_cents: i64) -> Result<i64> {
        if change_cents > 0 && change_cents > self.remaining_cents() {
            return Err(FundError::InsufficientBudget {
                remaining_cents: self.remaining_cents(),
                requested_cents: change_cents,
            });
        }
        self.allocated_cents
            .checked_add(change_cents)
            .ok_or_else(|| FundError::InvalidAmount(format!("change {change_cents} overflows")))
    }
}

/// The portion of a user's budget assigned to one page for a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// The funding user.
    pub user_id: UserId,

    /// The funded page.
    pub page_id: PageId,

    /// The cycle.
    pub month: Month,

    /// Allocated cents. Never negative.
    pub allocation_cents: i64,

    /// Highest sequence applied from writers that send no session.
    pub last_sequence: u64,

    /// Highest sequence applied, per client session.
    ///
    /// Each session numbers its own writes, so one session's sequences never
    /// shadow another's.
    #[serde(default)]
    pub session_sequences: BTreeMap<SessionId, u64>,

    /// When the allocation was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Allocation {
    /// Create an empty allocation.
    #[must_use]
    pub fn new(user_id: UserId, page_id: PageId, month: Month) -> Self {
        Self {
            user_id,
            page_id,
            month,
            allocation_cents: 0,
            last_sequence: 0,
            session_sequences: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Highest sequence applied from a session, 0 if none.
    #[must_use]
    pub fn sequence_for(&self, session_id: Option<SessionId>) -> u64 {
        match session_id {
            Some(session_id) => self.session_sequences.get(&session_id).copied().unwrap_or(0),
            None => self.last_sequence,
        }
    }

    /// Whether a session's write with this sequence has already been applied.
    ///
    /// Sequence 0 is never a replay.
    #[must_use]
    pub fn has_applied(&self, session_id: Option<SessionId>, client_sequence: u64) -> bool {
        client_sequence != 0 && client_sequence <= self.sequence_for(session_id)
    }

    /// Record a session's applied sequence.
    pub fn record_sequence(&mut self, session_id: Option<SessionId>, client_sequence: u64) {
        let last = match session_id {
            Some(session_id) => self.session_sequences.entry(session_id).or_insert(0),
            None => &mut self.last_sequence,
        };
        *last = (*last).max(client_sequence);
    }

    /// Check a change against this allocation and return the new value.
    ///
    /// # Errors
    ///
    /// Returns `FundError::InvalidAllocation` if the result would be negative,
    /// or `FundError::InvalidAmount` if it cannot be represented. The value
    /// is never clamped.
    pub fn checked_change(&self, change_cents: i64) -> Result<i64> {
        let next = self
            .allocation_cents
            .checked_add(change_cents)
            .ok_or_else(|| FundError::InvalidAmount(format!("change {change_cents} overflows")))?;
        if next < 0 {
            return Err(FundError::InvalidAllocation {
                current_cents: self.allocation_cents,
                change_cents,
            });
        }
        Ok(next)
    }
}

/// Where an allocation write originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationSource {
    /// Coalesced by the client batcher.
    Batch,
    /// High-priority direct write.
    Direct,
    /// Written by an operator or another service.
    Api,
}

/// One committed allocation change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: LedgerEntryId,

    /// The funding user.
    pub user_id: UserId,

    /// The funded page.
    pub page_id: PageId,

    /// The cycle.
    pub month: Month,

    /// Applied change in cents.
    pub change_cents: i64,

    /// Client-assigned sequence of the write.
    pub client_sequence: u64,

    /// Client session that numbered the write.
    #[serde(default)]
    pub session_id: Option<SessionId>,

    /// Where the write originated.
    pub source: AllocationSource,

    /// Page allocation after the change.
    pub page_allocation_after_cents: i64,

    /// User allocated total after the change.
    pub user_allocated_after_cents: i64,

    /// When the change was committed.
    pub created_at: DateTime<Utc>,
}

/// Who earns from a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageOwner {
    /// A single writer.
    Writer {
        /// The owning writer.
        writer_id: UserId,
    },
    /// A group splitting earnings among members.
    Group {
        /// The owning group.
        group_id: GroupId,
    },
}

/// Ownership record of a page, registered by the content service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// The page.
    pub page_id: PageId,

    /// Who earns from it.
    pub owner: PageOwner,

    /// When ownership was last registered.
    pub registered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(total: i64, allocated: i64) -> UserBudget {
        let month = Month::new(2026, 1).unwrap();
        let mut budget = UserBudget::new(UserId::generate(), month, total, month.end());
        budget.allocated_cents = allocated;
        budget
    }

    #[test]
    fn increase_beyond_remaining_is_rejected() {
        let budget = budget(1000, 600);
        assert_eq!(budget.checked_allocate(400), Ok(1000));
        assert_eq!(
            budget.checked_allocate(500),
            Err(FundError::InsufficientBudget {
                remaining_cents: 400,
                requested_cents: 500
            })
        );
    }

    #[test]
    fn decrease_always_fits_budget() {
        assert_eq!(budget(1000, 600).checked_allocate(-600), Ok(0));
    }

    #[test]
    fn negative_page_allocation_is_rejected_not_clamped() {
        let month = Month::new(2026, 1).unwrap();
        let mut allocation = Allocation::new(UserId::generate(), PageId::generate(), month);
        allocation.allocation_cents = 300;
        assert_eq!(allocation.checked_change(-300), Ok(0));
        assert_eq!(
            allocation.checked_change(-301),
            Err(FundError::InvalidAllocation {
                current_cents: 300,
                change_cents: -301
            })
        );
    }

    #[test]
    fn sequence_zero_is_never_a_replay() {
        let month = Month::new(2026, 1).unwrap();
        let mut allocation = Allocation::new(UserId::generate(), PageId::generate(), month);
        assert!(!allocation.has_applied(None, 0));
        allocation.record_sequence(None, 7);
        assert!(allocation.has_applied(None, 7));
        assert!(allocation.has_applied(None, 3));
        assert!(!allocation.has_applied(None, 8));
        assert!(!allocation.has_applied(None, 0));
    }

    #[test]
    fn sessions_track_sequences_independently() {
        let month = Month::new(2026, 1).unwrap();
        let mut allocation = Allocation::new(UserId::generate(), PageId::generate(), month);
        let (first_tab, second_tab) = (SessionId::generate(), SessionId::generate());
        allocation.record_sequence(Some(first_tab), 2000);

        assert!(allocation.has_applied(Some(first_tab), 1995));
        assert!(!allocation.has_applied(Some(second_tab), 1995));
        assert!(!allocation.has_applied(None, 1995));
        allocation.record_sequence(Some(second_tab), 1995);
        assert_eq!(allocation.sequence_for(Some(first_tab)), 2000);
        assert_eq!(allocation.sequence_for(Some(second_tab)), 1995);
    }

    #[test]
    fn overflowing_change_is_rejected() {
        let month = Month::new(2026, 1).unwrap();
        let mut allocation = Allocation::new(UserId::generate(), PageId::generate(), month);
        allocation.allocation_cents = 1;
        assert!(matches!(
            allocation.checked_change(i64::MAX),
            Err(FundError::InvalidAmount(_))
        ));

        assert!(matches!(
            budget(1000, 1).checked_allocate(i64::MAX),
            Err(FundError::InsufficientBudget { .. })
        ));
    }

    #[test]
    fn page_owner_is_tagged() {
        let owner = PageOwner::Writer {
            writer_id: UserId::generate(),
        };
        let json = serde_json::to_value(owner).unwrap();
        assert_eq!(json["type"], "writer");
    }
}
