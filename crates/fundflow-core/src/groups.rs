//! Group fund distribution.
//!
//! A group's monthly earnings are split among its members according to a
//! percentage configuration. Shares must sum to exactly 100 when the
//! configuration is saved; distribution never re-normalizes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FundError, Result};
use crate::ids::{GroupId, UserId};
use crate::money::apportion;

/// One member's percentage of a group's earnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberShare {
    /// The member writer.
    pub member_id: UserId,
    /// Whole percent of the group's earnings.
    pub percentage: u32,
}

/// How a group splits its earnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDistributionConfig {
    /// The group.
    pub group_id: GroupId,
    /// Member shares, summing to 100.
    pub members: Vec<MemberShare>,
    /// When the configuration was saved.
    pub updated_at: DateTime<Utc>,
}

impl GroupDistributionConfig {
    /// Build a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `FundError::InvalidGroupConfig` if there are no members, a
    /// member appears twice, a share exceeds 100, or the percentages do not
    /// sum to 100.
    pub fn new(group_id: GroupId, members: Vec<MemberShare>) -> Result<Self> {
        if members.is_empty() {
            return Err(FundError::InvalidGroupConfig(
                "group needs at least one member".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(members.len());
        for share in &members {
            if !seen.insert(share.member_id) {
                return Err(FundError::InvalidGroupConfig(format!(
                    "member {} listed more than once",
                    share.member_id
                )));
            }
        }

        if let Some(share) = members.iter().find(|m| m.percentage > 100) {
            return Err(FundError::InvalidGroupConfig(format!(
                "member {} has share {}, above 100",
                share.member_id, share.percentage
            )));
        }

        let sum: u64 = members.iter().map(|m| u64::from(m.percentage)).sum();
        if sum != 100 {
            return Err(FundError::InvalidGroupConfig(format!(
                "shares sum to {sum}, expected 100"
            )));
        }

        Ok(Self {
            group_id,
            members,
            updated_at: Utc::now(),
        })
    }
}

/// One member's cut of a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPayout {
    /// The member writer.
    pub member_id: UserId,
    /// Cents distributed to the member.
    pub amount_cents: i64,
}

/// The result of splitting one group's earnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDistribution {
    /// The group.
    pub group_id: GroupId,
    /// The group's total earnings.
    pub total_cents: i64,
    /// Per-member cuts, in configuration order. Sums to `total_cents`.
    pub payouts: Vec<MemberPayout>,
}

/// Split a group's earnings across its members.
///
/// `config` is the snapshot taken when distribution runs; later edits do not
/// affect a distribution already computed.
///
/// # Errors
///
/// Returns `FundError::InvalidAmount` if the total is negative or the
/// configuration carries no weight.
pub fn distribute(total_cents: i64, config: &GroupDistributionConfig) -> Result<GroupDistribution> {
    let weights: Vec<u64> = config
        .members
        .iter()
        .map(|m| u64::from(m.percentage))
        .collect();
    let amounts = apportion(total_cents, &weights)?;

    let payouts = config
        .members
        .iter()
        .zip(amounts)
        .map(|(share, amount_cents)| MemberPayout {
            member_id: share.member_id,
            amount_cents,
        })
        .collect();

    Ok(GroupDistribution {
        group_id: config.group_id,
        total_cents,
        payouts,
    })
}
