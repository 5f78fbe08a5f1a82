//! Monetary primitives.
//!
//! All ledger arithmetic is done in integer cents. Splitting a total across
//! several parties uses the largest-remainder method so the parts always sum
//! back to the original total: every share is truncated, then the leftover
//! cents go one at a time to the shares with the largest fractional
//! remainder. Ties go to the earlier share, which keeps results deterministic.

use serde::{Deserialize, Serialize};

use crate::error::{FundError, Result};

/// Basis points in one whole (100%).
pub const BASIS_POINTS_SCALE: u32 = 10_000;

/// Split `total_cents` proportionally to `weights` using the largest-remainder method.
///
/// The returned vector has the same length and order as `weights` and sums to
/// exactly `total_cents`.
///
/// # Errors
///
/// Returns `FundError::InvalidAmount` if `total_cents` is negative, if
/// `weights` is empty, or if every weight is zero.
pub fn apportion(total_cents: i64, weights: &[u64]) -> Result<Vec<i64>> {
    let total = u128::try_from(total_cents)
        .map_err(|_| FundError::InvalidAmount(format!("cannot apportion {total_cents} cents")))?;

    let weight_sum: u128 = weights.iter().map(|&w| u128::from(w)).sum();
    if weight_sum == 0 {
        return Err(FundError::InvalidAmount(
            "apportionment needs at least one non-zero weight".into(),
        ));
    }

    let mut shares = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (index, &weight) in weights.iter().enumerate() {
        let exact = total * u128::from(weight);
        shares.push(exact / weight_sum);
        remainders.push((exact % weight_sum, index));
    }

    let distributed: u128 = shares.iter().sum();
    let mut leftover = total - distributed;

    // Largest remainder first; equal remainders keep input order.
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, index) in remainders {
        if leftover == 0 {
            break;
        }
        shares[index] += 1;
        leftover -= 1;
    }

    shares
        .into_iter()
        .map(|share| {
            i64::try_from(share)
                .map_err(|_| FundError::InvalidAmount(format!("share {share} overflows")))
        })
        .collect()
}

/// A gross amount split into the platform fee and the creator's net payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Platform fee in cents.
    pub fee_cents: i64,
    /// Net payout in cents.
    pub net_cents: i64,
}

/// Split a gross amount into fee and net at `fee_bps` basis points.
///
/// `fee_cents + net_cents == gross_cents` always holds.
///
/// # Errors
///
/// Returns `FundError::InvalidAmount` if the gross is negative or the fee rate
/// exceeds 100%.
pub fn split_fee(gross_cents: i64, fee_bps: u32) -> Result<FeeSplit> {
    if fee_bps > BASIS_POINTS_SCALE {
        return Err(FundError::InvalidAmount(format!(
            "fee rate {fee_bps} bps exceeds 100%"
        )));
    }
    let parts = apportion(
        gross_cents,
        &[u64::from(fee_bps), u64::from(BASIS_POINTS_SCALE - fee_bps)],
    )?;
    Ok(FeeSplit {
        fee_cents: parts[0],
        net_cents: parts[1],
    })
}

/// Format cents as a dollar string without going through floating point.
#[must_use]
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_cent_goes_to_largest_fraction() {
        // 101 split 60/30/10 -> 60.6, 30.3, 10.1
        let parts = apportion(101, &[60, 30, 10]).unwrap();
        assert_eq!(parts, vec![61, 30, 10]);
    }

    #[test]
    fn shares_always_sum_to_total() {
        let weight_sets: [&[u64]; 4] = [&[1, 1, 1], &[33, 33, 34], &[7, 0, 93], &[50, 25, 12, 13]];
        for weights in weight_sets {
            for total in [0_i64, 1, 2, 99, 100, 101, 997, 1_000_003] {
                let parts = apportion(total, weights).unwrap();
                assert_eq!(parts.iter().sum::<i64>(), total, "weights={weights:?}");
                assert!(parts.iter().all(|&p| p >= 0));
            }
        }
    }

    #[test]
    fn ties_break_toward_earlier_share() {
        assert_eq!(apportion(2, &[1, 1, 1]).unwrap(), vec![1, 1, 0]);
        assert_eq!(apportion(1, &[1, 1]).unwrap(), vec![1, 0]);
    }

    #[test]
    fn zero_weight_never_receives_leftover() {
        assert_eq!(apportion(5, &[0, 1, 1]).unwrap(), vec![0, 3, 2]);
    }

    #[test]
    fn rejects_negative_total_and_empty_weights() {
        assert!(apportion(-1, &[1]).is_err());
        assert!(apportion(10, &[]).is_err());
        assert!(apportion(10, &[0, 0]).is_err());
    }

    #[test]
    fn ten_percent_fee_on_seven_dollars() {
        let split = split_fee(700, 1000).unwrap();
        assert_eq!(split.fee_cents, 70);
        assert_eq!(split.net_cents, 630);
    }

    #[test]
    fn fee_split_preserves_gross() {
        for gross in [1_i64, 3, 5, 15, 999] {
            let split = split_fee(gross, 700).unwrap();
            assert_eq!(split.fee_cents + split.net_cents, gross);
        }
        assert!(split_fee(100, 10_001).is_err());
    }

    #[test]
    fn formats_cents_as_dollars() {
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(1234), "$12.34");
        assert_eq!(format_cents(-5), "-$0.05");
    }
}
