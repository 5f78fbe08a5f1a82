//! Core types and monetary primitives for fundflow.
//!
//! This crate provides the foundational types used throughout the fundflow platform:
//!
//! - **Identifiers**: `UserId`, `PageId`, `GroupId`, `SessionId`, `LedgerEntryId`
//! - **Cycles**: `Month`, `CycleRecord`, `CycleStatus`
//! - **Allocations**: `UserBudget`, `Allocation`, `LedgerEntry`, `PageOwner`
//! - **Earnings**: `WriterEarningsRecord`, `WriterBalance`, `EarningsSummary`
//! - **Groups**: `GroupDistributionConfig`, `distribute`
//! - **Settlement**: `CycleSnapshot`, `settle`, `MonthlyTotals`
//! - **Reconciliation**: `LocalSubscription`, `ProcessorSubscription`, `classify`
//!
//! # Money
//!
//! All amounts are `i64` integer cents. Whenever an amount is divided, the
//! largest remainder method in [`money::apportion`] hands out the leftover
//! cents so parts always sum back to the whole.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod allocation;
pub mod cycle;
pub mod earnings;
pub mod error;
pub mod groups;
pub mod ids;
pub mod money;
pub mod reconciliation;
pub mod settlement;
pub mod totals;

pub use allocation::{
    Allocation, AllocationSource, LedgerEntry, PageOwner, PageRecord, UserBudget,
};
pub use cycle::{CycleRecord, CycleStatus, Month};
pub use earnings::{
    BankAccountStatus, EarningsLine, EarningsSource, EarningsStatus, EarningsSummary,
    WriterAccount, WriterBalance, WriterEarningsRecord, DEFAULT_PLATFORM_FEE_BPS,
    DEFAULT_SETTLEMENT_HOLD_DAYS, MINIMUM_PAYOUT_CENTS,
};
pub use error::{FundError, Result};
pub use groups::{distribute, GroupDistribution, GroupDistributionConfig, MemberPayout, MemberShare};
pub use ids::{GroupId, IdError, LedgerEntryId, PageId, SessionId, UserId};
pub use money::{apportion, format_cents, split_fee, FeeSplit, BASIS_POINTS_SCALE};
pub use reconciliation::{
    classify, Discrepancy, DiscrepancyType, LocalSubscription, ProcessorSubscription,
    ReconciliationReport, SubscriptionStatus, SyncFailure, SyncResult,
};
pub use settlement::{settle, CycleSnapshot, Settlement, SettlementPolicy};
pub use totals::MonthlyTotals;
