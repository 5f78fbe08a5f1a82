//! Funding cycle types.
//!
//! A cycle is one calendar month. Each cycle moves `Open -> Closing -> Closed`;
//! `Closed` is terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FundError, Result};

/// A calendar month identifying a funding cycle (`YYYY-MM`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Create a month.
    ///
    /// # Errors
    ///
    /// Returns `FundError::InvalidMonth` if `month` is not in `1..=12` or the
    /// year is outside `1..=9999`.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(FundError::InvalidMonth(format!("{year}-{month}")));
        }
        Ok(Self { year, month })
    }

    /// The month containing the given instant.
    #[must_use]
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    /// The calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// The month number (1-12).
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// The following month.
    #[must_use]
    pub const fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding month.
    #[must_use]
    pub const fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Midnight UTC on the first day of the month.
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        // Month::new guarantees a valid first-of-month date.
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map_or(DateTime::<Utc>::MIN_UTC, |midnight| {
                Utc.from_utc_datetime(&midnight)
            })
    }

    /// Midnight UTC on the first day of the following month.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    /// The finalization deadline: month end plus a grace period.
    #[must_use]
    pub fn deadline(&self, grace: Duration) -> DateTime<Utc> {
        self.end() + grace
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Debug for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Month({self})")
    }
}

impl FromStr for Month {
    type Err = FundError;

    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| FundError::InvalidMonth(s.to_string()))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(FundError::InvalidMonth(s.to_string()));
        }
        let year = year
            .parse()
            .map_err(|_| FundError::InvalidMonth(s.to_string()))?;
        let month = month
            .parse()
            .map_err(|_| FundError::InvalidMonth(s.to_string()))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for Month {
    type Error = FundError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(month: Month) -> Self {
        month.to_string()
    }
}

/// Lifecycle state of a funding cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Accepting allocation writes.
    Open,
    /// Finalization has started; allocation writes are rejected.
    Closing,
    /// Finalized. Terminal.
    Closed,
}

impl CycleStatus {
    /// Whether a cycle may move from `self` to `to`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Open, Self::Closing) | (Self::Closing, Self::Closed)
        )
    }
}

/// Persistent state of one funding cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// The cycle month.
    pub month: Month,

    /// Current lifecycle state.
    pub status: CycleStatus,

    /// When finalization becomes due.
    pub deadline_at: DateTime<Utc>,

    /// When the cycle was opened.
    pub opened_at: DateTime<Utc>,

    /// When finalization started.
    pub closing_started_at: Option<DateTime<Utc>>,

    /// When finalization completed.
    pub closed_at: Option<DateTime<Utc>>,
}

impl CycleRecord {
    /// Open a new cycle.
    #[must_use]
    pub fn open(month: Month, deadline_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            month,
            status: CycleStatus::Open,
            deadline_at,
            opened_at: now,
            closing_started_at: None,
            closed_at: None,
        }
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline_at
    }

    /// Move the cycle to `to`, stamping the transition time.
    ///
    /// # Errors
    ///
    /// Returns `FundError::InvalidCycleTransition` for any move other than
    /// `Open -> Closing` or `Closing -> Closed`.
    pub fn transition(&mut self, to: CycleStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(FundError::InvalidCycleTransition {
                month: self.month,
                from: self.status,
                to,
            });
        }
        match to {
            CycleStatus::Closing => self.closing_started_at = Some(now),
            CycleStatus::Closed => self.closed_at = Some(now),
            CycleStatus::Open => {}
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_parses_and_displays() {
        let month: Month = "2026-03".parse().unwrap();
        assert_eq!(month.year(), 2026);
        assert_eq!(month.month(), 3);
        assert_eq!(month.to_string(), "2026-03");
        assert!("2026-13".parse::<Month>().is_err());
        assert!("2026-3".parse::<Month>().is_err());
        assert!("garbage".parse::<Month>().is_err());
    }

    #[test]
    fn month_wraps_year() {
        let december = Month::new(2025, 12).unwrap();
        assert_eq!(december.next(), Month::new(2026, 1).unwrap());
        assert_eq!(december.next().previous(), december);
        assert_eq!(december.end(), Month::new(2026, 1).unwrap().start());
    }

    #[test]
    fn deadline_adds_grace() {
        let month = Month::new(2026, 2).unwrap();
        let deadline = month.deadline(Duration::hours(6));
        assert_eq!(deadline.to_rfc3339(), "2026-03-01T06:00:00+00:00");
    }

    #[test]
    fn cycle_only_moves_forward() {
        let month = Month::new(2026, 1).unwrap();
        let now = month.start();
        let mut cycle = CycleRecord::open(month, month.end(), now);

        assert!(cycle.transition(CycleStatus::Closed, now).is_err());
        cycle.transition(CycleStatus::Closing, now).unwrap();
        assert!(cycle.closing_started_at.is_some());
        cycle.transition(CycleStatus::Closed, now).unwrap();
        assert!(cycle.transition(CycleStatus::Open, now).is_err());
        assert!(cycle.transition(CycleStatus::Closing, now).is_err());
    }
}
