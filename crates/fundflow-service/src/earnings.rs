//! Writer earnings aggregation and payout bookkeeping.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use fundflow_core::{
    BankAccountStatus, EarningsStatus, EarningsSummary, Month, UserId, WriterAccount,
    WriterBalance, WriterEarningsRecord,
};
use fundflow_store::Store;

use crate::error::EngineError;

/// A writer's earnings as shown on their dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterEarningsView {
    /// Totals across every finalized month.
    pub balance: WriterBalance,
    /// Per-month records, newest first.
    pub records: Vec<WriterEarningsRecord>,
    /// Whether a payout may be requested.
    pub payout_eligible: bool,
    /// The payout threshold.
    pub minimum_payout_cents: i64,
}

/// A completed payout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutReceipt {
    /// The paid writer.
    pub writer_id: UserId,
    /// Net cents paid.
    pub amount_cents: i64,
    /// Months included.
    pub months: Vec<Month>,
    /// When the payout was recorded.
    pub paid_at: DateTime<Utc>,
}

/// Reads and updates writer earnings.
pub struct EarningsAggregator {
    store: Arc<dyn Store>,
    minimum_payout_cents: i64,
    write_lock: Mutex<()>,
}

impl EarningsAggregator {
    /// Create an aggregator.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, minimum_payout_cents: i64) -> Self {
        Self {
            store,
            minimum_payout_cents,
            write_lock: Mutex::new(()),
        }
    }

    fn bank_status(&self, writer_id: &UserId) -> Result<BankAccountStatus, EngineError> {
        Ok(self
            .store
            .get_writer_account(writer_id)?
            .map_or(BankAccountStatus::NotConnected, |a| a.bank_account_status))
    }

    /// A writer's balance and monthly records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn writer_earnings(
        &self,
        writer_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<WriterEarningsView, EngineError> {
        let mut records = self.store.list_writer_earnings(&writer_id)?;
        records.sort_by(|a, b| b.month.cmp(&a.month));
        for record in &mut records {
            record.status = record.effective_status(now);
        }

        let balance =
            WriterBalance::from_records(writer_id, &records, self.bank_status(&writer_id)?, now);

        Ok(WriterEarningsView {
            payout_eligible: balance.is_payout_eligible(self.minimum_payout_cents),
            balance,
            records,
            minimum_payout_cents: self.minimum_payout_cents,
        })
    }

    /// Platform-wide earnings summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn summary(&self, now: DateTime<Utc>) -> Result<EarningsSummary, EngineError> {
        let mut by_writer: BTreeMap<UserId, Vec<WriterEarningsRecord>> = BTreeMap::new();
        for record in self.store.list_all_writer_earnings()? {
            by_writer.entry(record.writer_id).or_default().push(record);
        }

        let mut summary = EarningsSummary::default();
        for (writer_id, records) in by_writer {
            let balance =
                WriterBalance::from_records(writer_id, &records, self.bank_status(&writer_id)?, now);
            summary.add(&balance, self.minimum_payout_cents);
        }
        Ok(summary)
    }

    /// Persist `Available` for every pending record whose hold has ended.
    ///
    /// Reads already treat such records as available; this keeps stored
    /// state in step. Returns the number of records updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn mature(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let _guard = self.write_lock.lock().await;
        let mut updated = 0;
        for mut record in self.store.list_all_writer_earnings()? {
            if record.status == EarningsStatus::Pending && record.effective_status(now) == EarningsStatus::Available {
                record.status = EarningsStatus::Available;
                self.store.put_writer_earnings(&record)?;
                updated += 1;
            }
        }
        if updated > 0 {
            tracing::info!(records = updated, "Earnings matured");
        }
        Ok(updated)
    }

    /// Set a writer's bank account status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn set_bank_status(
        &self,
        writer_id: UserId,
        status: BankAccountStatus,
    ) -> Result<WriterAccount, EngineError> {
        let _guard = self.write_lock.lock().await;
        let mut account = self
            .store
            .get_writer_account(&writer_id)?
            .unwrap_or_else(|| WriterAccount::new(writer_id));
        account.bank_account_status = status;
        account.updated_at = Utc::now();
        self.store.put_writer_account(&account)?;
        tracing::info!(writer_id = %writer_id, status = ?status, "Bank account status updated");
        Ok(account)
    }

    /// Mark a writer's available earnings as paid out.
    ///
    /// Only records past their hold are paid; pending records stay pending.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PayoutNotEligible` if the writer is below the
    /// threshold, has no verified bank account, or has nothing available.
    pub async fn record_payout(
        &self,
        writer_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<PayoutReceipt, EngineError> {
        let _guard = self.write_lock.lock().await;

        let records = self.store.list_writer_earnings(&writer_id)?;
        let balance =
            WriterBalance::from_records(writer_id, &records, self.bank_status(&writer_id)?, now);

        if balance.bank_account_status != BankAccountStatus::Verified {
            return Err(EngineError::PayoutNotEligible {
                writer_id,
                reason: "bank account is not verified".into(),
            });
        }
        if !balance.is_payout_eligible(self.minimum_payout_cents) {
            return Err(EngineError::PayoutNotEligible {
                writer_id,
                reason: format!(
                    "unpaid balance {} is below the minimum of {}",
                    balance.unpaid_cents(),
                    self.minimum_payout_cents
                ),
            });
        }
        if balance.available_earnings_cents == 0 {
            return Err(EngineError::PayoutNotEligible {
                writer_id,
                reason: "no earnings have cleared the settlement hold".into(),
            });
        }

        let mut amount_cents = 0;
        let mut months = Vec::new();
        for mut record in records {
            if record.effective_status(now) != EarningsStatus::Available {
                continue;
            }
            amount_cents += record.net_payout_cents;
            months.push(record.month);
            record.status = EarningsStatus::PaidOut;
            record.paid_out_at = Some(now);
            self.store.put_writer_earnings(&record)?;
        }
        months.sort();

        tracing::info!(
            writer_id = %writer_id,
            amount_cents,
            months = months.len(),
            "Payout recorded"
        );

        Ok(PayoutReceipt {
            writer_id,
            amount_cents,
            months,
            paid_at: now,
        })
    }
}
