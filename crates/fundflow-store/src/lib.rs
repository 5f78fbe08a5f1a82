//! Storage layer for fundflow.
//!
//! This crate provides persistent storage for budgets, allocations, the
//! allocation ledger, page ownership, group configs, cycles, writer
//! earnings, monthly totals and local subscriptions.
//!
//! Two backends implement [`Store`]:
//!
//! - [`MemoryStore`]: `BTreeMap`s behind a lock, used by tests and single-node
//!   development.
//! - `RocksStore` (default feature `rocksdb-backend`): `RocksDB` with one column family
//!   per record kind. Compound operations are written as a single `WriteBatch`.
//!
//! # Column families
//!
//! - `budgets`: keyed by `month || user_id`
//! - `allocations`: keyed by `month || user_id || page_id`
//! - `ledger` / `ledger_by_user`: entries keyed by ULID, indexed per user
//! - `earnings` / `earnings_by_month`: keyed by `writer_id || month`, indexed per month
//! - `pages`, `groups`, `cycles`, `writer_accounts`, `monthly_totals`, `subscriptions`
//!
//! # Example
//!
//! ```
//! use fundflow_store::{MemoryStore, Store};
//! use fundflow_core::{Month, UserBudget, UserId};
//!
//! let store = MemoryStore::new();
//! let month = Month::new(2026, 5).unwrap();
//! let user_id = UserId::generate();
//!
//! store.put_budget(&UserBudget::new(user_id, month, 1000, month.end())).unwrap();
//! let budget = store.get_budget(&user_id, month).unwrap().unwrap();
//! assert_eq!(budget.remaining_cents(), 1000);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use fundflow_core::{
    Allocation, CycleRecord, GroupDistributionConfig, GroupId, LedgerEntry, LocalSubscription,
    Month, MonthlyTotals, PageId, PageRecord, UserBudget, UserId, WriterAccount,
    WriterEarningsRecord,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing). Callers serialize read-modify-write
/// sequences themselves; the store only guarantees that each compound
/// operation lands atomically.
pub trait Store: Send + Sync {
    // =========================================================================
    // Budget Operations
    // =========================================================================

    /// Insert or update a user's cycle budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_budget(&self, budget: &UserBudget) -> Result<()>;

    /// Get a user's budget for a cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_budget(&self, user_id: &UserId, month: Month) -> Result<Option<UserBudget>>;

    /// List every budget of a cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_budgets(&self, month: Month) -> Result<Vec<UserBudget>>;

    // =========================================================================
    // Allocation Operations
    // =========================================================================

    /// Get one allocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_allocation(
        &self,
        user_id: &UserId,
        page_id: &PageId,
        month: Month,
    ) -> Result<Option<Allocation>>;

    /// List a user's allocations for a cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_allocations_by_user(&self, user_id: &UserId, month: Month) -> Result<Vec<Allocation>>;

    /// List every allocation of a cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_allocations(&self, month: Month) -> Result<Vec<Allocation>>;

    /// List a user's ledger entries, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_ledger_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    // =========================================================================
    // Page and Group Operations
    // =========================================================================

    /// Register or re-register page ownership.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_page(&self, page: &PageRecord) -> Result<()>;

    /// Get a page's ownership record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_page(&self, page_id: &PageId) -> Result<Option<PageRecord>>;

    /// List every registered page.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pages(&self) -> Result<Vec<PageRecord>>;

    /// Save a group's distribution config.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_group_config(&self, config: &GroupDistributionConfig) -> Result<()>;

    /// Get a group's distribution config.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_group_config(&self, group_id: &GroupId) -> Result<Option<GroupDistributionConfig>>;

    /// List every group config.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_group_configs(&self) -> Result<Vec<GroupDistributionConfig>>;

    // =========================================================================
    // Cycle Operations
    // =========================================================================

    /// Insert or update a cycle record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_cycle(&self, cycle: &CycleRecord) -> Result<()>;

    /// Get a cycle record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_cycle(&self, month: Month) -> Result<Option<CycleRecord>>;

    /// List every cycle, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_cycles(&self) -> Result<Vec<CycleRecord>>;

    // =========================================================================
    // Earnings Operations
    // =========================================================================

    /// Insert or update one writer's earnings for a month.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_writer_earnings(&self, record: &WriterEarningsRecord) -> Result<()>;

    /// List a writer's earnings, oldest month first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_writer_earnings(&self, writer_id: &UserId) -> Result<Vec<WriterEarningsRecord>>;

    /// List every writer's earnings for a month.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_earnings_by_month(&self, month: Month) -> Result<Vec<WriterEarningsRecord>>;

    /// List every earnings record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all_writer_earnings(&self) -> Result<Vec<WriterEarningsRecord>>;

    /// Insert or update a writer's payout account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_writer_account(&self, account: &WriterAccount) -> Result<()>;

    /// Get a writer's payout account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_writer_account(&self, writer_id: &UserId) -> Result<Option<WriterAccount>>;

    // =========================================================================
    // Totals Operations
    // =========================================================================

    /// Get a closed cycle's totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_monthly_totals(&self, month: Month) -> Result<Option<MonthlyTotals>>;

    /// List every cycle's totals, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_monthly_totals(&self) -> Result<Vec<MonthlyTotals>>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Insert or update a user's local subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_subscription(&self, subscription: &LocalSubscription) -> Result<()>;

    /// Get a user's local subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(&self, user_id: &UserId) -> Result<Option<LocalSubscription>>;

    /// List every local subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_subscriptions(&self) -> Result<Vec<LocalSubscription>>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Commit an allocation change: budget, allocation and ledger entry
    /// written atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written.
    fn commit_allocation(
        &self,
        budget: &UserBudget,
        allocation: &Allocation,
        entry: &LedgerEntry,
    ) -> Result<()>;

    /// Open a cycle: write the cycle record and every budget that does not
    /// exist yet, atomically. Existing budgets are left untouched.
    ///
    /// Returns the number of budgets inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written.
    fn open_cycle(&self, cycle: &CycleRecord, budgets: &[UserBudget]) -> Result<usize>;

    /// Persist a cycle's settlement: replace the month's earnings records
    /// and write its totals, atomically.
    ///
    /// Re-running with the same inputs leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written.
    fn persist_settlement(
        &self,
        month: Month,
        earnings: &[WriterEarningsRecord],
        totals: &MonthlyTotals,
    ) -> Result<()>;
}
