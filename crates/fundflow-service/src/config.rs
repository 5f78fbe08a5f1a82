//! Service configuration.

use std::path::Path;
use std::str::FromStr;

use chrono::Duration;
use serde::Deserialize;

use fundflow_core::{
    SettlementPolicy, DEFAULT_PLATFORM_FEE_BPS, DEFAULT_SETTLEMENT_HOLD_DAYS, MINIMUM_PAYOUT_CENTS,
};

/// Stripe API base URL.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/fundflow").
    pub data_dir: String,

    /// Service API key for gateway and service-to-service auth.
    pub service_api_key: Option<String>,

    /// Admin API key for finalization, reporting and reconciliation.
    pub admin_api_key: Option<String>,

    /// Stripe API key (optional).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL.
    pub stripe_api_base: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Platform fee in basis points (default: 1000 = 10%).
    pub platform_fee_bps: u32,

    /// Days finalized earnings stay pending (default: 30).
    pub settlement_hold_days: i64,

    /// Minimum unpaid balance for payout eligibility (default: 2500).
    pub minimum_payout_cents: i64,

    /// Hours after month end before a cycle is due (default: 0).
    pub cycle_grace_hours: i64,

    /// How often the finalization scheduler polls, in seconds (default: 300).
    pub finalization_poll_seconds: u64,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Try to load Stripe secrets from file first, then fall back to env vars
        let (stripe_api_key, stripe_webhook_secret) = load_stripe_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            stripe_api_key,
            stripe_webhook_secret,
            stripe_api_base: std::env::var("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            platform_fee_bps: env_or("PLATFORM_FEE_BPS", defaults.platform_fee_bps),
            settlement_hold_days: env_or("SETTLEMENT_HOLD_DAYS", defaults.settlement_hold_days),
            minimum_payout_cents: env_or("MINIMUM_PAYOUT_CENTS", defaults.minimum_payout_cents),
            cycle_grace_hours: env_or("CYCLE_GRACE_HOURS", defaults.cycle_grace_hours),
            finalization_poll_seconds: env_or(
                "FINALIZATION_POLL_SECONDS",
                defaults.finalization_poll_seconds,
            ),
        }
    }

    /// Fee and hold applied when a cycle is settled.
    #[must_use]
    pub fn settlement_policy(&self) -> SettlementPolicy {
        SettlementPolicy {
            platform_fee_bps: self.platform_fee_bps,
            settlement_hold: Duration::days(self.settlement_hold_days),
        }
    }

    /// Time after month end before a cycle becomes due.
    #[must_use]
    pub fn cycle_grace(&self) -> Duration {
        Duration::hours(self.cycle_grace_hours)
    }
}

/// Parse an environment variable, falling back to a default.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/stripe.json",
        "fundflow/.secrets/stripe.json",
        "../.secrets/stripe.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.api_key), secrets.webhook_secret);
        }
    }

    // Fall back to environment variables
    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        std::env::var("STRIPE_API_KEY").ok(),
        std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/fundflow".into(),
            service_api_key: None,
            admin_api_key: None,
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: STRIPE_API_BASE.into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
            settlement_hold_days: DEFAULT_SETTLEMENT_HOLD_DAYS,
            minimum_payout_cents: MINIMUM_PAYOUT_CENTS,
            cycle_grace_hours: 0,
            finalization_poll_seconds: 300,
        }
    }
}
