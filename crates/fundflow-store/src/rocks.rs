//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use fundflow_core::{
    Allocation, CycleRecord, GroupDistributionConfig, GroupId, LedgerEntry, LedgerEntryId,
    LocalSubscription, Month, MonthlyTotals, PageId, PageRecord, UserBudget, UserId,
    WriterAccount, WriterEarningsRecord,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(db_err)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn put<T: serde::Serialize>(&self, cf_name: &str, key: Vec<u8>, value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db.put_cf(&cf, key, value).map_err(db_err)
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: Vec<u8>) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Collect `(key, value)` pairs under a prefix, in key order.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut items = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            items.push((key.to_vec(), value.to_vec()));
        }
        Ok(items)
    }

    fn list_prefix<T: serde::de::DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<T>> {
        self.scan_prefix(cf_name, prefix)?
            .iter()
            .map(|(_, value)| Self::deserialize(value))
            .collect()
    }

    fn get_ledger_entry(&self, entry_id: &LedgerEntryId) -> Result<Option<LedgerEntry>> {
        self.get(cf::LEDGER, keys::ledger_key(entry_id))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Budget Operations
    // =========================================================================

    fn put_budget(&self, budget: &UserBudget) -> Result<()> {
        self.put(cf::BUDGETS, keys::budget_key(budget.month, &budget.user_id), budget)
    }

    fn get_budget(&self, user_id: &UserId, month: Month) -> Result<Option<UserBudget>> {
        self.get(cf::BUDGETS, keys::budget_key(month, user_id))
    }

    fn list_budgets(&self, month: Month) -> Result<Vec<UserBudget>> {
        self.list_prefix(cf::BUDGETS, &keys::month_key(month))
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
        self.get(cf::ALLOCATIONS, keys::allocation_key(month, user_id, page_id))
    }

    fn list_allocations_by_user(&self, user_id: &UserId, month: Month) -> Result<Vec<Allocation>> {
        self.list_prefix(cf::ALLOCATIONS, &keys::user_allocations_prefix(month, user_id))
    }

    fn list_allocations(&self, month: Month) -> Result<Vec<Allocation>> {
        self.list_prefix(cf::ALLOCATIONS, &keys::month_key(month))
    }

    fn list_ledger_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let prefix = keys::user_ledger_prefix(user_id);

        // ULIDs are time-ordered, so reversing the index scan gives newest first.
        let mut index = self.scan_prefix(cf::LEDGER_BY_USER, &prefix)?;
        index.reverse();

        let mut entries = Vec::new();
        for (key, _) in index.into_iter().skip(offset).take(limit) {
            let entry_id = keys::extract_entry_id_from_user_key(&key)?;
            if let Some(entry) = self.get_ledger_entry(&entry_id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    // =========================================================================
    // Page and Group Operations
    // =========================================================================

    fn put_page(&self, page: &PageRecord) -> Result<()> {
        self.put(cf::PAGES, keys::page_key(&page.page_id), page)
    }

    fn get_page(&self, page_id: &PageId) -> Result<Option<PageRecord>> {
        self.get(cf::PAGES, keys::page_key(page_id))
    }

    fn list_pages(&self) -> Result<Vec<PageRecord>> {
        self.list_prefix(cf::PAGES, &[])
    }

    fn put_group_config(&self, config: &GroupDistributionConfig) -> Result<()> {
        self.put(cf::GROUPS, keys::group_key(&config.group_id), config)
    }

    fn get_group_config(&self, group_id: &GroupId) -> Result<Option<GroupDistributionConfig>> {
        self.get(cf::GROUPS, keys::group_key(group_id))
    }

    fn list_group_configs(&self) -> Result<Vec<GroupDistributionConfig>> {
        self.list_prefix(cf::GROUPS, &[])
    }

    // =========================================================================
    // Cycle Operations
    // =========================================================================

    fn put_cycle(&self, cycle: &CycleRecord) -> Result<()> {
        self.put(cf::CYCLES, keys::month_key(cycle.month), cycle)
    }

    fn get_cycle(&self, month: Month) -> Result<Option<CycleRecord>> {
        self.get(cf::CYCLES, keys::month_key(month))
    }

    fn list_cycles(&self) -> Result<Vec<CycleRecord>> {
        self.list_prefix(cf::CYCLES, &[])
    }

    // =========================================================================
    // Earnings Operations
    // =========================================================================

    fn put_writer_earnings(&self, record: &WriterEarningsRecord) -> Result<()> {
        let cf_earnings = self.cf(cf::EARNINGS)?;
        let cf_by_month = self.cf(cf::EARNINGS_BY_MONTH)?;

        let value = Self::serialize(record)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_earnings, keys::earnings_key(&record.writer_id, record.month), &value);
        batch.put_cf(&cf_by_month, keys::month_earnings_key(record.month, &record.writer_id), []);

        self.db.write(batch).map_err(db_err)
    }

    fn list_writer_earnings(&self, writer_id: &UserId) -> Result<Vec<WriterEarningsRecord>> {
        self.list_prefix(cf::EARNINGS, &keys::user_key(writer_id))
    }

    fn list_earnings_by_month(&self, month: Month) -> Result<Vec<WriterEarningsRecord>> {
        let mut records = Vec::new();
        for (key, _) in self.scan_prefix(cf::EARNINGS_BY_MONTH, &keys::month_key(month))? {
            let writer_id = keys::extract_writer_from_month_key(&key)?;
            if let Some(record) = self.get(cf::EARNINGS, keys::earnings_key(&writer_id, month))? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn list_all_writer_earnings(&self) -> Result<Vec<WriterEarningsRecord>> {
        self.list_prefix(cf::EARNINGS, &[])
    }

    fn put_writer_account(&self, account: &WriterAccount) -> Result<()> {
        self.put(cf::WRITER_ACCOUNTS, keys::user_key(&account.writer_id), account)
    }

    fn get_writer_account(&self, writer_id: &UserId) -> Result<Option<WriterAccount>> {
        self.get(cf::WRITER_ACCOUNTS, keys::user_key(writer_id))
    }

    // =========================================================================
    // Totals Operations
    // =========================================================================

    fn get_monthly_totals(&self, month: Month) -> Result<Option<MonthlyTotals>> {
        self.get(cf::MONTHLY_TOTALS, keys::month_key(month))
    }

    fn list_monthly_totals(&self) -> Result<Vec<MonthlyTotals>> {
        self.list_prefix(cf::MONTHLY_TOTALS, &[])
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    fn put_subscription(&self, subscription: &LocalSubscription) -> Result<()> {
        self.put(cf::SUBSCRIPTIONS, keys::user_key(&subscription.user_id), subscription)
    }

    fn get_subscription(&self, user_id: &UserId) -> Result<Option<LocalSubscription>> {
        self.get(cf::SUBSCRIPTIONS, keys::user_key(user_id))
    }

    fn list_subscriptions(&self) -> Result<Vec<LocalSubscription>> {
        self.list_prefix(cf::SUBSCRIPTIONS, &[])
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
        let cf_budgets = self.cf(cf::BUDGETS)?;
        let cf_allocations = self.cf(cf::ALLOCATIONS)?;
        let cf_ledger = self.cf(cf::LEDGER)?;
        let cf_ledger_by_user = self.cf(cf::LEDGER_BY_USER)?;

        let budget_value = Self::serialize(budget)?;
        let allocation_value = Self::serialize(allocation)?;
        let entry_value = Self::serialize(entry)?;

        // Write atomically
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_budgets, keys::budget_key(budget.month, &budget.user_id), &budget_value);
        batch.put_cf(
            &cf_allocations,
            keys::allocation_key(allocation.month, &allocation.user_id, &allocation.page_id),
            &allocation_value,
        );
        batch.put_cf(&cf_ledger, keys::ledger_key(&entry.id), &entry_value);
        batch.put_cf(&cf_ledger_by_user, keys::user_ledger_key(&entry.user_id, &entry.id), []);

        self.db.write(batch).map_err(db_err)
    }

    fn open_cycle(&self, cycle: &CycleRecord, budgets: &[UserBudget]) -> Result<usize> {
        let cf_budgets = self.cf(cf::BUDGETS)?;
        let cf_cycles = self.cf(cf::CYCLES)?;

        let mut batch = WriteBatch::default();
        let mut inserted = 0;
        for budget in budgets {
            let key = keys::budget_key(budget.month, &budget.user_id);
            if self.db.get_cf(&cf_budgets, &key).map_err(db_err)?.is_none() {
                batch.put_cf(&cf_budgets, key, Self::serialize(budget)?);
                inserted += 1;
            }
        }
        batch.put_cf(&cf_cycles, keys::month_key(cycle.month), Self::serialize(cycle)?);

        self.db.write(batch).map_err(db_err)?;
        Ok(inserted)
    }

    fn persist_settlement(
        &self,
        month: Month,
        earnings: &[WriterEarningsRecord],
        totals: &MonthlyTotals,
    ) -> Result<()> {
        let cf_earnings = self.cf(cf::EARNINGS)?;
        let cf_by_month = self.cf(cf::EARNINGS_BY_MONTH)?;
        let cf_totals = self.cf(cf::MONTHLY_TOTALS)?;

        let mut batch = WriteBatch::default();

        // Drop any records from an earlier attempt before writing this one.
        for (key, _) in self.scan_prefix(cf::EARNINGS_BY_MONTH, &keys::month_key(month))? {
            let writer_id = keys::extract_writer_from_month_key(&key)?;
            batch.delete_cf(&cf_earnings, keys::earnings_key(&writer_id, month));
            batch.delete_cf(&cf_by_month, key);
        }

        for record in earnings {
            batch.put_cf(
                &cf_earnings,
                keys::earnings_key(&record.writer_id, record.month),
                Self::serialize(record)?,
            );
            batch.put_cf(&cf_by_month, keys::month_earnings_key(record.month, &record.writer_id), []);
        }
        batch.put_cf(&cf_totals, keys::month_key(month), Self::serialize(totals)?);

        self.db.write(batch).map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fundflow_core::{AllocationSource, CycleStatus, PageOwner, SessionId};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn month() -> Month {
        Month::new(2026, 5).unwrap()
    }

    #[test]
    fn budget_and_allocation_scans_stay_within_month() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        for m in [month(), month().next()] {
            let budget = UserBudget::new(user_id, m, 1000, m.end());
            let mut allocation = Allocation::new(user_id, PageId::generate(), m);
            allocation.allocation_cents = 100;
            let entry = LedgerEntry {
                id: LedgerEntryId::generate(),
                user_id,
                page_id: allocation.page_id,
                month: m,
                change_cents: 100,
                client_sequence: 1,
                session_id: None,
                source: AllocationSource::Api,
                page_allocation_after_cents: 100,
                user_allocated_after_cents: 100,
                created_at: Utc::now(),
            };
            store.commit_allocation(&budget, &allocation, &entry).unwrap();
        }

        assert_eq!(store.list_budgets(month()).unwrap().len(), 1);
        assert_eq!(store.list_allocations(month()).unwrap().len(), 1);
        assert_eq!(store.list_allocations_by_user(&user_id, month()).unwrap().len(), 1);
        assert_eq!(store.list_ledger_entries_by_user(&user_id, 10, 0).unwrap().len(), 2);
    }

    #[test]
    fn closing_cycle_and_allocations_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let user_id = UserId::generate();
        let session_id = SessionId::generate();
        let mut allocation = Allocation::new(user_id, PageId::generate(), month());

        {
            let store = RocksStore::open(dir.path()).unwrap();
            let mut cycle = CycleRecord::open(month(), month().end(), Utc::now());
            let mut budget = UserBudget::new(user_id, month(), 1000, month().end());
            store.open_cycle(&cycle, &[budget.clone()]).unwrap();

            budget.allocated_cents = 250;
            allocation.allocation_cents = 250;
            allocation.record_sequence(Some(session_id), 42);
            let entry = LedgerEntry {
                id: LedgerEntryId::generate(),
                user_id,
                page_id: allocation.page_id,
                month: month(),
                change_cents: 250,
                client_sequence: 42,
                session_id: Some(session_id),
                source: AllocationSource::Batch,
                page_allocation_after_cents: 250,
                user_allocated_after_cents: 250,
                created_at: Utc::now(),
            };
            store.commit_allocation(&budget, &allocation, &entry).unwrap();

            cycle.transition(CycleStatus::Closing, Utc::now()).unwrap();
            store.put_cycle(&cycle).unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get_cycle(month()).unwrap().unwrap().status,
            CycleStatus::Closing
        );
        assert_eq!(
            store.get_budget(&user_id, month()).unwrap().unwrap().allocated_cents,
            250
        );
        let restored = store
            .get_allocation(&user_id, &allocation.page_id, month())
            .unwrap()
            .unwrap();
        assert_eq!(restored, allocation);
        assert!(restored.has_applied(Some(session_id), 42));
    }

    #[test]
    fn pages_roundtrip() {
        let (store, _dir) = create_test_store();
        let page = PageRecord {
            page_id: PageId::generate(),
            owner: PageOwner::Writer {
                writer_id: UserId::generate(),
            },
            registered_at: Utc::now(),
        };
        store.put_page(&page).unwrap();
        assert_eq!(store.get_page(&page.page_id).unwrap(), Some(page));
        assert_eq!(store.list_pages().unwrap().len(), 1);
    }

    #[test]
    fn open_cycle_inserts_only_missing_budgets() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let cycle = CycleRecord::open(month(), month().end(), Utc::now());
        let budget = UserBudget::new(user_id, month(), 1000, month().end());

        assert_eq!(store.open_cycle(&cycle, &[budget.clone()]).unwrap(), 1);
        assert_eq!(store.open_cycle(&cycle, &[budget]).unwrap(), 0);
    }
}
