//! Historical per-cycle totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::Month;

/// Platform-wide figures for one closed cycle. One row per cycle, never updated
/// after the cycle closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotals {
    /// The closed cycle.
    pub month: Month,

    /// Sum of all user budgets.
    pub total_subscription_cents: i64,

    /// Sum of all allocations.
    pub total_allocated_cents: i64,

    /// Budgets left unallocated.
    pub total_unallocated_cents: i64,

    /// Platform fee withheld from creators.
    pub platform_fee_cents: i64,

    /// Net paid to creators.
    pub creator_payouts_cents: i64,

    /// Allocations to pages with no registered owner or group config.
    pub unattributed_cents: i64,

    /// `unallocated + fee + unattributed`.
    pub platform_revenue_cents: i64,

    /// Allocated share of subscriptions, in percent. Reporting only.
    pub allocation_rate: f64,

    /// Users with a budget in the cycle.
    pub user_count: usize,

    /// Writers credited with earnings.
    pub writer_count: usize,

    /// When the totals were computed.
    pub finalized_at: DateTime<Utc>,
}

impl MonthlyTotals {
    /// Allocated share of subscriptions in percent, rounded to two places.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(allocated_cents: i64, subscription_cents: i64) -> f64 {
        if subscription_cents <= 0 {
            return 0.0;
        }
        let basis_points = allocated_cents * 10_000 / subscription_cents;
        basis_points as f64 / 100.0
    }
}
