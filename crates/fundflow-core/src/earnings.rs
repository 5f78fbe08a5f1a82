//! Writer earnings types.
//!
//! Finalization produces one [`WriterEarningsRecord`] per `(writer, month)`.
//! Records start `Pending`, become `Available` once the settlement hold has
//! elapsed, and end `PaidOut`. Writer balances are always summed from the
//! records rather than kept as running counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::Month;
use crate::ids::{GroupId, PageId, UserId};

/// Minimum balance in cents before a writer may request a payout ($25).
pub const MINIMUM_PAYOUT_CENTS: i64 = 2500;

/// Default platform fee in basis points (10%).
pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 1000;

/// Default days before finalized earnings become available.
pub const DEFAULT_SETTLEMENT_HOLD_DAYS: i64 = 30;

/// Verification state of a writer's payout bank account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankAccountStatus {
    /// No account connected.
    #[default]
    NotConnected,
    /// Connected, verification in progress.
    Pending,
    /// Verified and able to receive payouts.
    Verified,
    /// Payouts blocked by the processor.
    Restricted,
}

/// Settlement state of one month of earnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarningsStatus {
    /// Finalized, still inside the settlement hold.
    Pending,
    /// Settled and payable.
    Available,
    /// Paid out to the writer.
    PaidOut,
}

/// What a line of earnings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EarningsSource {
    /// A page the writer owns directly.
    Page {
        /// The page.
        page_id: PageId,
    },
    /// The writer's share of a group's earnings.
    Group {
        /// The group.
        group_id: GroupId,
    },
}

/// One contribution to a writer's monthly earnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsLine {
    /// Origin of the funds.
    pub source: EarningsSource,
    /// Gross cents.
    pub gross_cents: i64,
    /// Platform fee attributed to this line.
    pub fee_cents: i64,
}

/// A writer's finalized earnings for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterEarningsRecord {
    /// The earning writer.
    pub writer_id: UserId,

    /// The finalized cycle.
    pub month: Month,

    /// Total funds attributed to the writer.
    pub gross_earnings_cents: i64,

    /// Platform fee withheld.
    pub platform_fee_cents: i64,

    /// `gross - fee`.
    pub net_payout_cents: i64,

    /// Settlement state.
    pub status: EarningsStatus,

    /// Per-page and per-group breakdown.
    pub lines: Vec<EarningsLine>,

    /// When the cycle was finalized.
    pub finalized_at: DateTime<Utc>,

    /// When the hold ends.
    pub available_at: DateTime<Utc>,

    /// When the record was paid out.
    pub paid_out_at: Option<DateTime<Utc>>,
}

impl WriterEarningsRecord {
    /// Status as of `now`, treating pending records past their hold as available.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> EarningsStatus {
        match self.status {
            EarningsStatus::Pending if now >= self.available_at => EarningsStatus::Available,
            status => status,
        }
    }
}

/// Payout account state of a writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterAccount {
    /// The writer.
    pub writer_id: UserId,

    /// Bank account verification state.
    pub bank_account_status: BankAccountStatus,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WriterAccount {
    /// Create an account with no bank connected.
    #[must_use]
    pub fn new(writer_id: UserId) -> Self {
        Self {
            writer_id,
            bank_account_status: BankAccountStatus::NotConnected,
            updated_at: Utc::now(),
        }
    }
}

/// A writer's balance summed across every finalized month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterBalance {
    /// The writer.
    pub writer_id: UserId,
    /// Net earnings still inside the settlement hold.
    pub pending_earnings_cents: i64,
    /// Net earnings settled and payable.
    pub available_earnings_cents: i64,
    /// Net earnings already paid out.
    pub paid_out_cents: i64,
    /// Lifetime gross.
    pub lifetime_gross_cents: i64,
    /// Lifetime platform fee.
    pub lifetime_fee_cents: i64,
    /// Lifetime net.
    pub lifetime_net_cents: i64,
    /// Bank account verification state.
    pub bank_account_status: BankAccountStatus,
}

impl WriterBalance {
    /// Sum a writer's records as of `now`.
    #[must_use]
    pub fn from_records(
        writer_id: UserId,
        records: &[WriterEarningsRecord],
        bank_account_status: BankAccountStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let mut balance = Self {
            writer_id,
            pending_earnings_cents: 0,
            available_earnings_cents: 0,
            paid_out_cents: 0,
            lifetime_gross_cents: 0,
            lifetime_fee_cents: 0,
            lifetime_net_cents: 0,
            bank_account_status,
        };
        for record in records.iter().filter(|r| r.writer_id == writer_id) {
            balance.lifetime_gross_cents += record.gross_earnings_cents;
            balance.lifetime_fee_cents += record.platform_fee_cents;
            balance.lifetime_net_cents += record.net_payout_cents;
            match record.effective_status(now) {
                EarningsStatus::Pending => balance.pending_earnings_cents += record.net_payout_cents,
                EarningsStatus::Available => {
                    balance.available_earnings_cents += record.net_payout_cents;
                }
                EarningsStatus::PaidOut => balance.paid_out_cents += record.net_payout_cents,
            }
        }
        balance
    }

    /// Unpaid earnings (pending plus available).
    #[must_use]
    pub const fn unpaid_cents(&self) -> i64 {
        self.pending_earnings_cents + self.available_earnings_cents
    }

    /// Whether the writer may request a payout.
    #[must_use]
    pub fn is_payout_eligible(&self, minimum_payout_cents: i64) -> bool {
        self.unpaid_cents() >= minimum_payout_cents
            && self.bank_account_status == BankAccountStatus::Verified
    }
}

/// Aggregate earnings figures for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsSummary {
    /// Lifetime gross across all writers.
    pub total_gross_cents: i64,
    /// Lifetime net across all writers.
    pub total_net_cents: i64,
    /// Lifetime platform fee across all writers.
    pub total_fee_cents: i64,
    /// Pending net across all writers.
    pub total_pending_cents: i64,
    /// Available net across all writers.
    pub total_available_cents: i64,
    /// Writers with at least one earnings record.
    pub writer_count: usize,
    /// Writers currently eligible for payout.
    pub eligible_writer_count: usize,
}

impl EarningsSummary {
    /// Fold one writer balance into the summary.
    pub fn add(&mut self, balance: &WriterBalance, minimum_payout_cents: i64) {
        self.total_gross_cents += balance.lifetime_gross_cents;
        self.total_net_cents += balance.lifetime_net_cents;
        self.total_fee_cents += balance.lifetime_fee_cents;
        self.total_pending_cents += balance.pending_earnings_cents;
        self.total_available_cents += balance.available_earnings_cents;
        self.writer_count += 1;
        if balance.is_payout_eligible(minimum_payout_cents) {
            self.eligible_writer_count += 1;
        }
    }
}
