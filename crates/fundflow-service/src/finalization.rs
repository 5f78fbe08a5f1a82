//! Monthly finalization job.
//!
//! Closes a cycle in four steps, each safe to repeat:
//!
//! 1. Move the cycle to `Closing`, which stops allocation writes.
//! 2. Snapshot budgets, allocations, page ownership and group configs, then
//!    settle them into writer earnings and platform totals.
//! 3. Persist the settlement, replacing anything a previous attempt wrote.
//! 4. Open the next cycle and mark this one `Closed`.
//!
//! A crash anywhere leaves the cycle `Closing`; the next run resumes from
//! step 2 and, because settlement uses the stored closing timestamp, writes
//! identical records.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fundflow_core::{
    settle, CycleSnapshot, CycleStatus, FundError, Month, MonthlyTotals, SettlementPolicy,
};
use fundflow_store::Store;

use crate::error::EngineError;
use crate::ledger::AllocationLedger;

/// Outcome of a finalization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationReport {
    /// The finalized cycle.
    pub month: Month,
    /// Platform totals of the cycle.
    pub totals: MonthlyTotals,
    /// Writers credited.
    pub writer_count: usize,
    /// Groups distributed.
    pub group_count: usize,
    /// The cycle opened afterwards.
    pub next_month: Month,
    /// Whether this run picked up an interrupted finalization.
    pub resumed: bool,
    /// Whether the cycle was already closed and nothing ran.
    pub already_closed: bool,
}

/// Runs cycle finalization.
pub struct FinalizationJob {
    store: Arc<dyn Store>,
    ledger: Arc<AllocationLedger>,
    policy: SettlementPolicy,
}

impl FinalizationJob {
    /// Create a job.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<AllocationLedger>,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            policy,
        }
    }

    /// Finalize a cycle.
    ///
    /// An already closed cycle returns its stored totals. An open cycle
    /// before its deadline is refused unless `force` is set.
    ///
    /// # Errors
    ///
    /// - `FundError::CycleNotFound` if the cycle was never opened.
    /// - `EngineError::NotDue` if the deadline has not passed and `force` is unset.
    /// - Store errors from any step; the cycle stays `Closing` and the next
    ///   run resumes it.
    pub async fn finalize(
        &self,
        month: Month,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<FinalizationReport, EngineError> {
        let cycle = self
            .store
            .get_cycle(month)?
            .ok_or(FundError::CycleNotFound { month })?;

        let (cycle, resumed) = match cycle.status {
            CycleStatus::Closed => return self.closed_report(month),
            CycleStatus::Open => {
                if !force && !cycle.is_due(now) {
                    return Err(EngineError::NotDue {
                        month,
                        deadline_at: cycle.deadline_at,
                    });
                }
                (self.ledger.begin_closing(month, now).await?, false)
            }
            CycleStatus::Closing => {
                tracing::warn!(month = %month, "Resuming interrupted finalization");
                (cycle, true)
            }
        };

        let finalized_at = cycle.closing_started_at.unwrap_or(now);
        let snapshot = self.snapshot(month)?;
        let settlement = settle(&snapshot, self.policy, finalized_at)?;

        self.store
            .persist_settlement(month, &settlement.writer_earnings, &settlement.totals)?;

        let next_month = month.next();
        self.ledger.open_cycle(next_month, now).await?;
        self.ledger.mark_closed(month, now).await?;

        tracing::info!(
            month = %month,
            writers = settlement.writer_earnings.len(),
            groups = settlement.group_distributions.len(),
            total_allocated_cents = settlement.totals.total_allocated_cents,
            platform_revenue_cents = settlement.totals.platform_revenue_cents,
            creator_payouts_cents = settlement.totals.creator_payouts_cents,
            resumed,
            "Cycle finalized"
        );

        Ok(FinalizationReport {
            month,
            writer_count: settlement.writer_earnings.len(),
            group_count: settlement.group_distributions.len(),
            totals: settlement.totals,
            next_month,
            resumed,
            already_closed: false,
        })
    }

    /// Finalize every cycle that is due, plus any interrupted one.
    ///
    /// Returns one report per cycle finalized. A failing cycle is logged and
    /// left for the next run.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Vec<FinalizationReport> {
        let cycles = match self.store.list_cycles() {
            Ok(cycles) => cycles,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list cycles");
                return Vec::new();
            }
        };

        let mut reports = Vec::new();
        for cycle in cycles {
            let ready = match cycle.status {
                CycleStatus::Closing => true,
                CycleStatus::Open => cycle.is_due(now),
                CycleStatus::Closed => false,
            };
            if !ready {
                continue;
            }
            match self.finalize(cycle.month, false, now).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(month = %cycle.month, error = %e, "Finalization failed"),
            }
        }
        reports
    }

    fn snapshot(&self, month: Month) -> Result<CycleSnapshot, EngineError> {
        Ok(CycleSnapshot {
            month,
            budgets: self.store.list_budgets(month)?,
            allocations: self.store.list_allocations(month)?,
            pages: self
                .store
                .list_pages()?
                .into_iter()
                .map(|page| (page.page_id, page.owner))
                .collect(),
            groups: self
                .store
                .list_group_configs()?
                .into_iter()
                .map(|config| (config.group_id, config))
                .collect(),
        })
    }

    fn closed_report(&self, month: Month) -> Result<FinalizationReport, EngineError> {
        let totals = self
            .store
            .get_monthly_totals(month)?
            .ok_or(FundError::CycleNotFound { month })?;
        tracing::debug!(month = %month, "Cycle already finalized");
        Ok(FinalizationReport {
            month,
            writer_count: totals.writer_count,
            group_count: 0,
            totals,
            next_month: month.next(),
            resumed: false,
            already_closed: true,
        })
    }
}

/// Run [`FinalizationJob::run_due`] on a fixed interval until the runtime
/// shuts down.
pub fn spawn_scheduler(job: Arc<FinalizationJob>, interval: StdDuration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reports = job.run_due(Utc::now()).await;
            if !reports.is_empty() {
                tracing::info!(finalized = reports.len(), "Scheduled finalization complete");
            }
        }
    })
}
