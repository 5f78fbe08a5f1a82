//! Application state.

use std::sync::Arc;

use fundflow_store::Store;

use crate::config::ServiceConfig;
use crate::earnings::EarningsAggregator;
use crate::finalization::FinalizationJob;
use crate::ledger::AllocationLedger;
use crate::reconciliation::{PaymentProcessor, ReconciliationEngine};
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Allocation ledger.
    pub ledger: Arc<AllocationLedger>,

    /// Cycle finalization.
    pub finalization: Arc<FinalizationJob>,

    /// Writer earnings.
    pub earnings: Arc<EarningsAggregator>,

    /// Reconciliation against the payment processor (optional).
    pub reconciliation: Option<Arc<ReconciliationEngine>>,
}

impl AppState {
    /// Create a new application state, using Stripe as the payment
    /// processor when configured.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::with_base_url(key, &config.stripe_api_base) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - reconciliation will not be available");
        }

        Self::build(store, config, stripe.map(|s| s as Arc<dyn PaymentProcessor>))
    }

    /// Create a new application state with an explicit payment processor.
    #[must_use]
    pub fn with_processor(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self::build(store, config, Some(processor))
    }

    fn build(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        processor: Option<Arc<dyn PaymentProcessor>>,
    ) -> Self {
        let ledger = Arc::new(AllocationLedger::new(
            Arc::clone(&store),
            config.cycle_grace(),
        ));
        let finalization = Arc::new(FinalizationJob::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            config.settlement_policy(),
        ));
        let earnings = Arc::new(EarningsAggregator::new(
            Arc::clone(&store),
            config.minimum_payout_cents,
        ));
        let reconciliation = processor.map(|processor| {
            Arc::new(ReconciliationEngine::new(
                Arc::clone(&store),
                Arc::clone(&ledger),
                processor,
            ))
        });

        Self {
            store,
            config,
            ledger,
            finalization,
            earnings,
            reconciliation,
        }
    }

    /// Check if reconciliation is available.
    #[must_use]
    pub fn has_reconciliation(&self) -> bool {
        self.reconciliation.is_some()
    }
}
