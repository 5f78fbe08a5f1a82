//! In-memory storage implementation.
//!
//! Every table is a `BTreeMap` keyed the same way the `RocksDB` backend keys
//! its column families, so iteration order matches between backends.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use fundflow_core::{
    Allocation, CycleRecord, GroupDistributionConfig, GroupId, LedgerEntry, LedgerEntryId,
    LocalSubscription, Month, MonthlyTotals, PageId, PageRecord, UserBudget, UserId,
    WriterAccount, WriterEarningsRecord,
};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Default)]
struct Tables {
    budgets: BTreeMap<(Month, UserId), UserBudget>,
    allocations: BTreeMap<(Month, UserId, PageId), Allocation>,
    ledger: BTreeMap<(UserId, LedgerEntryId), LedgerEntry>,
    pages: BTreeMap<PageId, PageRecord>,
    groups: BTreeMap<GroupId, GroupDistributionConfig>,
    cycles: BTreeMap<Month, CycleRecord>,
    earnings: BTreeMap<(UserId, Month), WriterEarningsRecord>,
    writer_accounts: BTreeMap<UserId, WriterAccount>,
    totals: BTreeMap<Month, MonthlyTotals>,
    subscriptions: BTreeMap<UserId, LocalSubscription>,
}

/// Memory-backed storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Budget Operations
    // =========================================================================

    fn put_budget(&self, budget: &UserBudget) -> Result<()> {
        self.write()?
            .budgets
            .insert((budget.month, budget.user_id), budget.clone());
        Ok(())
    }

    fn get_budget(&self, user_id: &UserId, month: Month) -> Result<Option<UserBudget>> {
        Ok(self.read()?.budgets.get(&(month, *user_id)).cloned())
    }

    fn list_budgets(&self, month: Month) -> Result<Vec<UserBudget>> {
        Ok(self
            .read()?
            .budgets
            .iter()
            .filter(|((m, _), _)| *m == month)
            .map(|(_, budget)| budget.clone())
            .collect())
    }

    // =========================================================================
    // Allocation Operations
    // =========================================================================

    fn get_allocation(
        &self,
        user_id: &UserId,
        page_id: &PageId,
        month: Month,
    ) -> Result<Option<Allocation>> {
        Ok(self
            .read()?
            .allocations
            .get(&(month, *user_id, *page_id))
            .cloned())
    }

    fn list_allocations_by_user(&self, user_id: &UserId, month: Month) -> Result<Vec<Allocation>> {
        Ok(self
            .read()?
            .allocations
            .iter()
            .filter(|((m, u, _), _)| *m == month && u == user_id)
            .map(|(_, allocation)| allocation.clone())
            .collect())
    }

    fn list_allocations(&self, month: Month) -> Result<Vec<Allocation>> {
        Ok(self
            .read()?
            .allocations
            .iter()
            .filter(|((m, _, _), _)| *m == month)
            .map(|(_, allocation)| allocation.clone())
            .collect())
    }

    fn list_ledger_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .read()?
            .ledger
            .iter()
            .rev()
            .filter(|((u, _), _)| u == user_id)
            .skip(offset)
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    // =========================================================================
    // Page and Group Operations
    // =========================================================================

    fn put_page(&self, page: &PageRecord) -> Result<()> {
        self.write()?.pages.insert(page.page_id, page.clone());
        Ok(())
    }

    fn get_page(&self, page_id: &PageId) -> Result<Option<PageRecord>> {
        Ok(self.read()?.pages.get(page_id).cloned())
    }

    fn list_pages(&self) -> Result<Vec<PageRecord>> {
        Ok(self.read()?.pages.values().cloned().collect())
    }

    fn put_group_config(&self, config: &GroupDistributionConfig) -> Result<()> {
        self.write()?.groups.insert(config.group_id, config.clone());
        Ok(())
    }

    fn get_group_config(&self, group_id: &GroupId) -> Result<Option<GroupDistributionConfig>> {
        Ok(self.read()?.groups.get(group_id).cloned())
    }

    fn list_group_configs(&self) -> Result<Vec<GroupDistributionConfig>> {
        Ok(self.read()?.groups.values().cloned().collect())
    }

    // =========================================================================
    // Cycle Operations
    // =========================================================================

    fn put_cycle(&self, cycle: &CycleRecord) -> Result<()> {
        self.write()?.cycles.insert(cycle.month, cycle.clone());
        Ok(())
    }

    fn get_cycle(&self, month: Month) -> Result<Option<CycleRecord>> {
        Ok(self.read()?.cycles.get(&month).cloned())
    }

    fn list_cycles(&self) -> Result<Vec<CycleRecord>> {
        Ok(self.read()?.cycles.values().cloned().collect())
    }

    // =========================================================================
    // Earnings Operations
    // =========================================================================

    fn put_writer_earnings(&self, record: &WriterEarningsRecord) -> Result<()> {
        self.write()?
            .earnings
            .insert((record.writer_id, record.month), record.clone());
        Ok(())
    }

    fn list_writer_earnings(&self, writer_id: &UserId) -> Result<Vec<WriterEarningsRecord>> {
        Ok(self
            .read()?
            .earnings
            .iter()
            .filter(|((w, _), _)| w == writer_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn list_earnings_by_month(&self, month: Month) -> Result<Vec<WriterEarningsRecord>> {
        Ok(self
            .read()?
            .earnings
            .iter()
            .filter(|((_, m), _)| *m == month)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn list_all_writer_earnings(&self) -> Result<Vec<WriterEarningsRecord>> {
        Ok(self.read()?.earnings.values().cloned().collect())
    }

    fn put_writer_account(&self, account: &WriterAccount) -> Result<()> {
        self.write()?
            .writer_accounts
            .insert(account.writer_id, account.clone());
        Ok(())
    }

    fn get_writer_account(&self, writer_id: &UserId) -> Result<Option<WriterAccount>> {
        Ok(self.read()?.writer_accounts.get(writer_id).cloned())
    }

    // =========================================================================
    // Totals Operations
    // =========================================================================

    fn get_monthly_totals(&self, month: Month) -> Result<Option<MonthlyTotals>> {
        Ok(self.read()?.totals.get(&month).cloned())
    }

    fn list_monthly_totals(&self) -> Result<Vec<MonthlyTotals>> {
        Ok(self.read()?.totals.values().cloned().collect())
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    fn put_subscription(&self, subscription: &LocalSubscription) -> Result<()> {
        self.write()?
            .subscriptions
            .insert(subscription.user_id, subscription.clone());
        Ok(())
    }

    fn get_subscription(&self, user_id: &UserId) -> Result<Option<LocalSubscription>> {
        Ok(self.read()?.subscriptions.get(user_id).cloned())
    }

    fn list_subscriptions(&self) -> Result<Vec<LocalSubscription>> {
        Ok(self.read()?.subscriptions.values().cloned().collect())
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn commit_allocation(
        &self,
        budget: &UserBudget,
        allocation: &Allocation,
        entry: &LedgerEntry,
    ) -> Result<()> {
        let mut tables = self.write()?;
        tables
            .budgets
            .insert((budget.month, budget.user_id), budget.clone());
        tables.allocations.insert(
            (allocation.month, allocation.user_id, allocation.page_id),
            allocation.clone(),
        );
        tables
            .ledger
            .insert((entry.user_id, entry.id), entry.clone());
        Ok(())
    }

    fn open_cycle(&self, cycle: &CycleRecord, budgets: &[UserBudget]) -> Result<usize> {
        let mut tables = self.write()?;
        let mut inserted = 0;
        for budget in budgets {
            let key = (budget.month, budget.user_id);
            if !tables.budgets.contains_key(&key) {
                tables.budgets.insert(key, budget.clone());
                inserted += 1;
            }
        }
        tables.cycles.insert(cycle.month, cycle.clone());
        Ok(inserted)
    }

    fn persist_settlement(
        &self,
        month: Month,
        earnings: &[WriterEarningsRecord],
        totals: &MonthlyTotals,
    ) -> Result<()> {
        let mut tables = self.write()?;
        tables.earnings.retain(|(_, m), _| *m != month);
        for record in earnings {
            tables
                .earnings
                .insert((record.writer_id, record.month), record.clone());
        }
        tables.totals.insert(month, totals.clone());
        Ok(())
    }
}
