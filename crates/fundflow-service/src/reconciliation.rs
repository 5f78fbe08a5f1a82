//! Subscription reconciliation against the payment processor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use fundflow_core::{
    classify, DiscrepancyType, LocalSubscription, Month, ProcessorSubscription,
    ReconciliationReport, SubscriptionStatus, SyncFailure, SyncResult, UserId,
};
use fundflow_store::Store;

use crate::error::EngineError;
use crate::ledger::AllocationLedger;
use crate::stripe::StripeError;

/// Source of truth for subscription state.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Every subscription the processor knows, of any status.
    async fn list_subscriptions(&self) -> Result<Vec<ProcessorSubscription>, StripeError>;
}

/// Detects and corrects drift between local subscriptions and the processor.
pub struct ReconciliationEngine {
    store: Arc<dyn Store>,
    ledger: Arc<AllocationLedger>,
    processor: Arc<dyn PaymentProcessor>,
}

impl ReconciliationEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<AllocationLedger>,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            store,
            ledger,
            processor,
        }
    }

    /// Compare local records against the processor without changing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor or the store cannot be read.
    pub async fn check(&self, month: Month) -> Result<ReconciliationReport, EngineError> {
        let processor = self.processor.list_subscriptions().await?;
        let local = self.store.list_subscriptions()?;
        let report = classify(month, &local, &processor, Utc::now());

        tracing::info!(
            month = %month,
            in_sync = report.is_in_sync,
            discrepancies = report.discrepancies.len(),
            processor_total_cents = report.processor_total_cents,
            local_total_cents = report.local_total_cents,
            "Reconciliation check complete"
        );

        Ok(report)
    }

    /// Check, then bring local records in line with the processor.
    ///
    /// `missing_local` discrepancies are only counted; creating local state
    /// for an unknown subscriber is left to an operator. A failure on one
    /// record is collected and the run continues.
    ///
    /// # Errors
    ///
    /// Returns an error only if the initial check fails.
    pub async fn sync(&self, month: Month) -> Result<(ReconciliationReport, SyncResult), EngineError> {
        let report = self.check(month).await?;
        let mut result = SyncResult::default();

        for discrepancy in &report.discrepancies {
            let user_id = discrepancy.user_id;
            let outcome = match discrepancy.discrepancy_type {
                DiscrepancyType::StaleLocal => self
                    .correct(user_id, 0, SubscriptionStatus::Cancelled)
                    .await
                    .map(|()| result.stale_records_fixed += 1),
                DiscrepancyType::AmountMismatch => self
                    .correct(
                        user_id,
                        discrepancy.processor_amount_cents,
                        SubscriptionStatus::Active,
                    )
                    .await
                    .map(|()| result.amount_mismatches_fixed += 1),
                DiscrepancyType::MissingLocal => {
                    tracing::warn!(
                        user_id = %user_id,
                        subscription_id = ?discrepancy.subscription_id,
                        amount_cents = discrepancy.processor_amount_cents,
                        "Processor subscription has no local record"
                    );
                    result.missing_local_flagged += 1;
                    Ok(())
                }
            };

            if let Err(e) = outcome {
                tracing::error!(user_id = %user_id, error = %e, "Reconciliation correction failed");
                result.errors.push(SyncFailure {
                    user_id,
                    message: e.to_string(),
                });
            }
        }

        tracing::info!(
            month = %month,
            stale_records_fixed = result.stale_records_fixed,
            amount_mismatches_fixed = result.amount_mismatches_fixed,
            missing_local_flagged = result.missing_local_flagged,
            errors = result.errors.len(),
            "Reconciliation sync complete"
        );

        Ok((report, result))
    }

    async fn correct(
        &self,
        user_id: UserId,
        amount_cents: i64,
        status: SubscriptionStatus,
    ) -> Result<(), EngineError> {
        let existing = self.store.get_subscription(&user_id)?;
        let record = LocalSubscription {
            user_id,
            amount_cents,
            status,
            processor_subscription_id: existing.and_then(|s| s.processor_subscription_id),
            updated_at: Utc::now(),
        };
        self.store.put_subscription(&record)?;

        if record.funding_cents() > 0 {
            self.ledger.refresh_budget(user_id, record.funding_cents()).await?;
        }
        Ok(())
    }
}
