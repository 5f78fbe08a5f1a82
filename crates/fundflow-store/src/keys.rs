//! Key encoding utilities for `RocksDB`.
//!
//! Months encode as their 7-byte `YYYY-MM` form, so keys that start with a
//! month sort chronologically and can be prefix-scanned per cycle.

use fundflow_core::{GroupId, LedgerEntryId, Month, PageId, UserId};

use crate::error::{Result, StoreError};

/// Length of an encoded month.
pub const MONTH_LEN: usize = 7;

/// Length of an encoded UUID or ULID.
pub const ID_LEN: usize = 16;

/// Encode a month.
#[must_use]
pub fn month_key(month: Month) -> Vec<u8> {
    month.to_string().into_bytes()
}

/// Create a budget key.
///
/// Format: `month (7 bytes) || user_id (16 bytes)`
#[must_use]
pub fn budget_key(month: Month, user_id: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(MONTH_LEN + ID_LEN);
    key.extend_from_slice(&month_key(month));
    key.extend_from_slice(user_id.as_bytes());
    key
}

/// Create an allocation key.
///
/// Format: `month (7 bytes) || user_id (16 bytes) || page_id (16 bytes)`
#[must_use]
pub fn allocation_key(month: Month, user_id: &UserId, page_id: &PageId) -> Vec<u8> {
    let mut key = budget_key(month, user_id);
    key.extend_from_slice(page_id.as_bytes());
    key
}

/// Create a prefix for iterating one user's allocations in a cycle.
#[must_use]
pub fn user_allocations_prefix(month: Month, user_id: &UserId) -> Vec<u8> {
    budget_key(month, user_id)
}

/// Create a ledger entry key.
#[must_use]
pub fn ledger_key(entry_id: &LedgerEntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// Create a user-ledger index key.
///
/// Format: `user_id (16 bytes) || entry_id (16 bytes)`
///
/// Since ULIDs are time-ordered, entries for a user will be sorted by time.
#[must_use]
pub fn user_ledger_key(user_id: &UserId, entry_id: &LedgerEntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN * 2);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Create a prefix for iterating all ledger entries for a user.
#[must_use]
pub fn user_ledger_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the entry ID from a user-ledger index key.
///
/// # Errors
///
/// Returns `StoreError::CorruptKey` if the key is not 32 bytes.
pub fn extract_entry_id_from_user_key(key: &[u8]) -> Result<LedgerEntryId> {
    let bytes: [u8; ID_LEN] = key
        .get(ID_LEN..ID_LEN * 2)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(StoreError::CorruptKey("ledger_by_user"))?;
    Ok(LedgerEntryId::from_bytes(bytes))
}

/// Create a page key.
#[must_use]
pub fn page_key(page_id: &PageId) -> Vec<u8> {
    page_id.as_bytes().to_vec()
}

/// Create a group key.
#[must_use]
pub fn group_key(group_id: &GroupId) -> Vec<u8> {
    group_id.as_bytes().to_vec()
}

/// Create a writer account or subscription key.
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create an earnings key.
///
/// Format: `writer_id (16 bytes) || month (7 bytes)`
#[must_use]
pub fn earnings_key(writer_id: &UserId, month: Month) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN + MONTH_LEN);
    key.extend_from_slice(writer_id.as_bytes());
    key.extend_from_slice(&month_key(month));
    key
}

/// Create a month-earnings index key.
///
/// Format: `month (7 bytes) || writer_id (16 bytes)`
#[must_use]
pub fn month_earnings_key(month: Month, writer_id: &UserId) -> Vec<u8> {
    budget_key(month, writer_id)
}

/// Extract the writer ID from a month-earnings index key.
///
/// # Errors
///
/// Returns `StoreError::CorruptKey` if the key is not 23 bytes.
pub fn extract_writer_from_month_key(key: &[u8]) -> Result<UserId> {
    let bytes: [u8; ID_LEN] = key
        .get(MONTH_LEN..MONTH_LEN + ID_LEN)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(StoreError::CorruptKey("earnings_by_month"))?;
    Ok(UserId::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_keys_sort_chronologically() {
        let dec = month_key(Month::new(2025, 12).unwrap());
        let jan = month_key(Month::new(2026, 1).unwrap());
        assert_eq!(dec.len(), MONTH_LEN);
        assert!(dec < jan);
    }

    #[test]
    fn allocation_key_starts_with_user_prefix() {
        let month = Month::new(2026, 3).unwrap();
        let user_id = UserId::generate();
        let page_id = PageId::generate();
        let key = allocation_key(month, &user_id, &page_id);

        assert_eq!(key.len(), MONTH_LEN + ID_LEN * 2);
        assert!(key.starts_with(&user_allocations_prefix(month, &user_id)));
        assert_eq!(&key[MONTH_LEN + ID_LEN..], page_id.as_bytes());
    }

    #[test]
    fn extract_entry_id_roundtrip() {
        let user_id = UserId::generate();
        let entry_id = LedgerEntryId::generate();
        let key = user_ledger_key(&user_id, &entry_id);

        assert_eq!(extract_entry_id_from_user_key(&key).unwrap(), entry_id);
        assert!(extract_entry_id_from_user_key(&key[..20]).is_err());
    }

    #[test]
    fn extract_writer_from_month_key_roundtrip() {
        let month = Month::new(2026, 3).unwrap();
        let writer_id = UserId::generate();
        let key = month_earnings_key(month, &writer_id);
        assert_eq!(extract_writer_from_month_key(&key).unwrap(), writer_id);
    }
}
