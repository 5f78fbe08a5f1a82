//! Cycle settlement.
//!
//! Turns a snapshot of a closing cycle into writer earnings and platform
//! totals. The computation is pure and deterministic: running it twice over
//! the same snapshot yields identical records, which is what lets
//! finalization resume after a crash by simply recomputing.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::allocation::{Allocation, PageOwner, UserBudget};
use crate::cycle::Month;
use crate::earnings::{EarningsLine, EarningsSource, EarningsStatus, WriterEarningsRecord};
use crate::error::Result;
use crate::groups::{distribute, GroupDistribution, GroupDistributionConfig};
use crate::ids::{GroupId, PageId, UserId};
use crate::money::{apportion, split_fee};
use crate::totals::MonthlyTotals;

/// Everything settlement reads about a closing cycle.
#[derive(Debug, Clone)]
pub struct CycleSnapshot {
    /// The closing cycle.
    pub month: Month,
    /// Every user budget of the cycle.
    pub budgets: Vec<UserBudget>,
    /// Every allocation of the cycle.
    pub allocations: Vec<Allocation>,
    /// Page ownership, as registered at snapshot time.
    pub pages: HashMap<PageId, PageOwner>,
    /// Group configurations, as saved at snapshot time.
    pub groups: HashMap<GroupId, GroupDistributionConfig>,
}

/// Settlement parameters.
#[derive(Debug, Clone, Copy)]
pub struct SettlementPolicy {
    /// Platform fee in basis points.
    pub platform_fee_bps: u32,
    /// How long earnings stay pending.
    pub settlement_hold: Duration,
}

/// Computed outcome of a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    /// One record per credited writer, ordered by writer.
    pub writer_earnings: Vec<WriterEarningsRecord>,
    /// Group splits performed, ordered by group.
    pub group_distributions: Vec<GroupDistribution>,
    /// Platform totals.
    pub totals: MonthlyTotals,
}

/// Settle a cycle snapshot.
///
/// # Errors
///
/// Returns an error only if a monetary primitive rejects its input, which
/// cannot happen for snapshots satisfying the ledger invariants.
pub fn settle(
    snapshot: &CycleSnapshot,
    policy: SettlementPolicy,
    finalized_at: DateTime<Utc>,
) -> Result<Settlement> {
    let mut writer_lines: BTreeMap<UserId, Vec<(EarningsSource, i64)>> = BTreeMap::new();
    let mut group_totals: BTreeMap<GroupId, i64> = BTreeMap::new();
    let mut unattributed_cents = 0_i64;
    let mut total_allocated_cents = 0_i64;

    // Attribute each positive allocation to its page owner, summing per page
    // so a writer's lines are one per page regardless of funder count.
    let mut page_totals: BTreeMap<PageId, i64> = BTreeMap::new();
    for allocation in snapshot.allocations.iter().filter(|a| a.allocation_cents > 0) {
        total_allocated_cents += allocation.allocation_cents;
        *page_totals.entry(allocation.page_id).or_default() += allocation.allocation_cents;
    }

    for (page_id, cents) in page_totals {
        match snapshot.pages.get(&page_id) {
            Some(PageOwner::Writer { writer_id }) => {
                writer_lines
                    .entry(*writer_id)
                    .or_default()
                    .push((EarningsSource::Page { page_id }, cents));
            }
            Some(PageOwner::Group { group_id }) => {
                *group_totals.entry(*group_id).or_default() += cents;
            }
            None => {
                tracing::warn!(page_id = %page_id, cents, "Allocation to unregistered page");
                unattributed_cents += cents;
            }
        }
    }

    let mut group_distributions = Vec::with_capacity(group_totals.len());
    for (group_id, cents) in group_totals {
        let Some(config) = snapshot.groups.get(&group_id) else {
            tracing::warn!(group_id = %group_id, cents, "Group has no distribution config");
            unattributed_cents += cents;
            continue;
        };
        let distribution = distribute(cents, config)?;
        for payout in distribution.payouts.iter().filter(|p| p.amount_cents > 0) {
            writer_lines
                .entry(payout.member_id)
                .or_default()
                .push((EarningsSource::Group { group_id }, payout.amount_cents));
        }
        group_distributions.push(distribution);
    }

    let available_at = finalized_at + policy.settlement_hold;
    let mut writer_earnings = Vec::with_capacity(writer_lines.len());
    let mut platform_fee_cents = 0_i64;
    let mut creator_payouts_cents = 0_i64;

    for (writer_id, lines) in writer_lines {
        let gross: i64 = lines.iter().map(|(_, cents)| cents).sum();
        let split = split_fee(gross, policy.platform_fee_bps)?;

        // Spread the writer's fee over their lines so per-line fees add up
        // to the fee taken on the combined gross.
        let weights: Vec<u64> = lines
            .iter()
            .map(|(_, cents)| u64::try_from(*cents).unwrap_or(0))
            .collect();
        let line_fees = apportion(split.fee_cents, &weights)?;

        platform_fee_cents += split.fee_cents;
        creator_payouts_cents += split.net_cents;

        writer_earnings.push(WriterEarningsRecord {
            writer_id,
            month: snapshot.month,
            gross_earnings_cents: gross,
            platform_fee_cents: split.fee_cents,
            net_payout_cents: split.net_cents,
            status: EarningsStatus::Pending,
            lines: lines
                .into_iter()
                .zip(line_fees)
                .map(|((source, gross_cents), fee_cents)| EarningsLine {
                    source,
                    gross_cents,
                    fee_cents,
                })
                .collect(),
            finalized_at,
            available_at,
            paid_out_at: None,
        });
    }

    let total_subscription_cents: i64 = snapshot.budgets.iter().map(|b| b.total_budget_cents).sum();
    let total_unallocated_cents: i64 = snapshot
        .budgets
        .iter()
        .map(|b| (b.total_budget_cents - b.allocated_cents).max(0))
        .sum();

    let totals = MonthlyTotals {
        month: snapshot.month,
        total_subscription_cents,
        total_allocated_cents,
        total_unallocated_cents,
        platform_fee_cents,
        creator_payouts_cents,
        unattributed_cents,
        platform_revenue_cents: total_unallocated_cents + platform_fee_cents + unattributed_cents,
        allocation_rate: MonthlyTotals::rate(total_allocated_cents, total_subscription_cents),
        user_count: snapshot.budgets.len(),
        writer_count: writer_earnings.len(),
        finalized_at,
    };

    Ok(Settlement {
        writer_earnings,
        group_distributions,
        totals,
    })
}
