//! Subscription reconciliation types.
//!
//! Local subscription records are compared against the payment processor,
//! which is always treated as the source of truth. Classification is a pure
//! function of both snapshots so a check can be re-run at any time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::Month;
use crate::ids::UserId;

/// Status of a subscription, locally or at the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and funding budgets.
    Active,
    /// Payment failed; still considered funding until cancelled.
    PastDue,
    /// Cancelled or ended.
    Cancelled,
}

impl SubscriptionStatus {
    /// Whether the status funds a budget.
    #[must_use]
    pub const fn is_funding(self) -> bool {
        matches!(self, Self::Active | Self::PastDue)
    }
}

/// The locally recorded subscription of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSubscription {
    /// The subscribing user.
    pub user_id: UserId,
    /// Monthly amount in cents; becomes the user's budget.
    pub amount_cents: i64,
    /// Local status.
    pub status: SubscriptionStatus,
    /// Processor subscription ID, when known.
    pub processor_subscription_id: Option<String>,
    /// When the record was last changed.
    pub updated_at: DateTime<Utc>,
}

impl LocalSubscription {
    /// Cents this record funds each cycle (zero unless funding).
    #[must_use]
    pub const fn funding_cents(&self) -> i64 {
        if self.status.is_funding() {
            self.amount_cents
        } else {
            0
        }
    }
}

/// A subscription as reported by the payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSubscription {
    /// The subscribing user, from processor metadata.
    pub user_id: UserId,
    /// Processor subscription ID.
    pub subscription_id: String,
    /// Processor status.
    pub status: SubscriptionStatus,
    /// Monthly amount in cents.
    pub amount_cents: i64,
}

/// Kind of drift between local and processor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyType {
    /// Local shows funding but the processor shows cancelled or zero.
    StaleLocal,
    /// The processor shows funding but no local record exists.
    MissingLocal,
    /// Both funding with different amounts.
    AmountMismatch,
}

/// One detected drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Kind of drift.
    #[serde(rename = "type")]
    pub discrepancy_type: DiscrepancyType,
    /// The affected user.
    pub user_id: UserId,
    /// Processor subscription ID, when the processor knows one.
    pub subscription_id: Option<String>,
    /// Funding amount at the processor.
    pub processor_amount_cents: i64,
    /// Funding amount recorded locally.
    pub local_amount_cents: i64,
}

/// Result of comparing local records against the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// The cycle being reconciled.
    pub month: Month,
    /// `discrepancies.is_empty()`.
    pub is_in_sync: bool,
    /// Every drift found, ordered by user.
    pub discrepancies: Vec<Discrepancy>,
    /// Sum of funding amounts at the processor.
    pub processor_total_cents: i64,
    /// Users with a funding processor subscription.
    pub processor_subscriber_count: usize,
    /// Sum of funding amounts locally.
    pub local_total_cents: i64,
    /// Users with a funding local subscription.
    pub local_user_count: usize,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

/// Outcome of applying reconciliation corrections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// `stale_local` records zeroed.
    pub stale_records_fixed: usize,
    /// `amount_mismatch` records corrected.
    pub amount_mismatches_fixed: usize,
    /// `missing_local` records left for review.
    pub missing_local_flagged: usize,
    /// Per-record failures; one failure never aborts the run.
    pub errors: Vec<SyncFailure>,
}

/// A correction that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// The affected user.
    pub user_id: UserId,
    /// What went wrong.
    pub message: String,
}

/// Collapse processor subscriptions to one funding amount per user.
///
/// A user with several funding subscriptions is credited their sum; the
/// first funding subscription ID is kept for reference.
fn processor_funding(processor: &[ProcessorSubscription]) -> BTreeMap<UserId, (i64, Option<String>)> {
    let mut funding: BTreeMap<UserId, (i64, Option<String>)> = BTreeMap::new();
    for sub in processor {
        let entry = funding.entry(sub.user_id).or_insert((0, None));
        if sub.status.is_funding() && sub.amount_cents > 0 {
            entry.0 += sub.amount_cents;
            if entry.1.is_none() {
                entry.1 = Some(sub.subscription_id.clone());
            }
        } else if entry.1.is_none() {
            entry.1 = Some(sub.subscription_id.clone());
        }
    }
    funding
}

/// Compare local records against the processor.
#[must_use]
pub fn classify(
    month: Month,
    local: &[LocalSubscription],
    processor: &[ProcessorSubscription],
    checked_at: DateTime<Utc>,
) -> ReconciliationReport {
    let processor_by_user = processor_funding(processor);
    let local_by_user: BTreeMap<UserId, &LocalSubscription> =
        local.iter().map(|s| (s.user_id, s)).collect();

    let mut discrepancies = Vec::new();

    for (user_id, record) in &local_by_user {
        let local_amount = record.funding_cents();
        let (processor_amount, subscription_id) = processor_by_user
            .get(user_id)
            .cloned()
            .unwrap_or((0, None));

        let discrepancy_type = if local_amount > 0 && processor_amount == 0 {
            Some(DiscrepancyType::StaleLocal)
        } else if processor_amount > 0 && local_amount != processor_amount {
            Some(DiscrepancyType::AmountMismatch)
        } else {
            None
        };

        if let Some(discrepancy_type) = discrepancy_type {
            discrepancies.push(Discrepancy {
                discrepancy_type,
                user_id: *user_id,
                subscription_id: subscription_id.or_else(|| record.processor_subscription_id.clone()),
                processor_amount_cents: processor_amount,
                local_amount_cents: local_amount,
            });
        }
    }

    for (user_id, (processor_amount, subscription_id)) in &processor_by_user {
        if *processor_amount > 0 && !local_by_user.contains_key(user_id) {
            discrepancies.push(Discrepancy {
                discrepancy_type: DiscrepancyType::MissingLocal,
                user_id: *user_id,
                subscription_id: subscription_id.clone(),
                processor_amount_cents: *processor_amount,
                local_amount_cents: 0,
            });
        }
    }

    discrepancies.sort_by_key(|d| d.user_id);

    let processor_funded: Vec<i64> = processor_by_user
        .values()
        .map(|(amount, _)| *amount)
        .filter(|amount| *amount > 0)
        .collect();
    let local_funded: Vec<i64> = local
        .iter()
        .map(LocalSubscription::funding_cents)
        .filter(|amount| *amount > 0)
        .collect();

    ReconciliationReport {
        month,
        is_in_sync: discrepancies.is_empty(),
        discrepancies,
        processor_total_cents: processor_funded.iter().sum(),
        processor_subscriber_count: processor_funded.len(),
        local_total_cents: local_funded.iter().sum(),
        local_user_count: local_funded.len(),
        checked_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(user_id: UserId, amount_cents: i64, status: SubscriptionStatus) -> LocalSubscription {
        LocalSubscription {
            user_id,
            amount_cents,
            status,
            processor_subscription_id: None,
            updated_at: Utc::now(),
        }
    }

    fn remote(user_id: UserId, amount_cents: i64, status: SubscriptionStatus) -> ProcessorSubscription {
        ProcessorSubscription {
            user_id,
            subscription_id: format!("sub_{user_id}"),
            status,
            amount_cents,
        }
    }

    fn month() -> Month {
        Month::new(2026, 4).unwrap()
    }

    #[test]
    fn local_paid_processor_zero_is_stale() {
        let user = UserId::generate();
        let report = classify(
            month(),
            &[local(user, 500, SubscriptionStatus::Active)],
            &[remote(user, 0, SubscriptionStatus::Cancelled)],
            Utc::now(),
        );
        assert!(!report.is_in_sync);
        assert_eq!(report.discrepancies.len(), 1);
        assert_eq!(report.discrepancies[0].discrepancy_type, DiscrepancyType::StaleLocal);
        assert_eq!(report.discrepancies[0].local_amount_cents, 500);
        assert_eq!(report.discrepancies[0].processor_amount_cents, 0);
    }

    #[test]
    fn local_without_processor_record_is_stale() {
        let user = UserId::generate();
        let report = classify(month(), &[local(user, 1000, SubscriptionStatus::Active)], &[], Utc::now());
        assert_eq!(report.discrepancies[0].discrepancy_type, DiscrepancyType::StaleLocal);
    }

    #[test]
    fn processor_without_local_is_missing() {
        let user = UserId::generate();
        let report = classify(month(), &[], &[remote(user, 1500, SubscriptionStatus::Active)], Utc::now());
        assert_eq!(report.discrepancies[0].discrepancy_type, DiscrepancyType::MissingLocal);
        assert_eq!(report.processor_total_cents, 1500);
        assert_eq!(report.processor_subscriber_count, 1);
        assert_eq!(report.local_user_count, 0);
    }

    #[test]
    fn differing_amounts_mismatch() {
        let user = UserId::generate();
        let report = classify(
            month(),
            &[local(user, 1000, SubscriptionStatus::Active)],
            &[remote(user, 2000, SubscriptionStatus::Active)],
            Utc::now(),
        );
        assert_eq!(report.discrepancies[0].discrepancy_type, DiscrepancyType::AmountMismatch);
    }

    #[test]
    fn matching_and_both_cancelled_are_in_sync() {
        let (a, b) = (UserId::generate(), UserId::generate());
        let report = classify(
            month(),
            &[
                local(a, 1000, SubscriptionStatus::Active),
                local(b, 800, SubscriptionStatus::Cancelled),
            ],
            &[
                remote(a, 1000, SubscriptionStatus::Active),
                remote(b, 800, SubscriptionStatus::Cancelled),
            ],
            Utc::now(),
        );
        assert!(report.is_in_sync);
        assert_eq!(report.local_total_cents, 1000);
        assert_eq!(report.local_user_count, 1);
    }
}
