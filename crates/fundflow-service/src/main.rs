//! Fundflow Service - allocation ledger, finalization and reconciliation API
//!
//! This is the main entry point for the fundflow service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fundflow_service::finalization::spawn_scheduler;
use fundflow_service::{create_router, AppState, ServiceConfig};
use fundflow_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fundflow=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fundflow Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        stripe_configured = %config.stripe_api_key.is_some(),
        platform_fee_bps = config.platform_fee_bps,
        settlement_hold_days = config.settlement_hold_days,
        "Service configuration loaded"
    );

    let store = open_store(&config.data_dir)?;

    // Build app state
    let state = AppState::new(store, config.clone());

    // Finalize due cycles in the background
    let scheduler = spawn_scheduler(
        Arc::clone(&state.finalization),
        Duration::from_secs(config.finalization_poll_seconds),
    );
    tracing::info!(
        poll_seconds = config.finalization_poll_seconds,
        "Finalization scheduler started"
    );

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    scheduler.abort();
    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(data_dir: &str) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %data_dir, "Opening RocksDB store");
    Ok(Arc::new(fundflow_store::RocksStore::open(data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(data_dir: &str) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::warn!(
        path = %data_dir,
        "Built without rocksdb-backend - using in-memory store, data will not persist"
    );
    Ok(Arc::new(fundflow_store::MemoryStore::new()))
}
