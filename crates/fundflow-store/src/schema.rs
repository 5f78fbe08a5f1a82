//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Cycle budgets, keyed by `month || user_id`.
    pub const BUDGETS: &str = "budgets";

    /// Page allocations, keyed by `month || user_id || page_id`.
    pub const ALLOCATIONS: &str = "allocations";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER: &str = "ledger";

    /// Index: ledger entries by user, keyed by `user_id || entry_id`.
    /// Value is empty (index only).
    pub const LEDGER_BY_USER: &str = "ledger_by_user";

    /// Page ownership, keyed by `page_id`.
    pub const PAGES: &str = "pages";

    /// Group distribution configs, keyed by `group_id`.
    pub const GROUPS: &str = "groups";

    /// Cycle records, keyed by `month`.
    pub const CYCLES: &str = "cycles";

    /// Writer earnings, keyed by `writer_id || month`.
    pub const EARNINGS: &str = "earnings";

    /// Index: writer earnings by month, keyed by `month || writer_id`.
    /// Value is empty (index only).
    pub const EARNINGS_BY_MONTH: &str = "earnings_by_month";

    /// Writer payout accounts, keyed by `writer_id`.
    pub const WRITER_ACCOUNTS: &str = "writer_accounts";

    /// Monthly totals, keyed by `month`.
    pub const MONTHLY_TOTALS: &str = "monthly_totals";

    /// Local subscriptions, keyed by `user_id`.
    pub const SUBSCRIPTIONS: &str = "subscriptions";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::BUDGETS,
        cf::ALLOCATIONS,
        cf::LEDGER,
        cf::LEDGER_BY_USER,
        cf::PAGES,
        cf::GROUPS,
        cf::CYCLES,
        cf::EARNINGS,
        cf::EARNINGS_BY_MONTH,
        cf::WRITER_ACCOUNTS,
        cf::MONTHLY_TOTALS,
        cf::SUBSCRIPTIONS,
    ]
}
