//! Stripe API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use fundflow_core::ProcessorSubscription;

use super::types::{StripeErrorResponse, StripeList, Subscription};
use crate::config::STRIPE_API_BASE;
use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::reconciliation::PaymentProcessor;

/// Maximum age of a signed webhook, in seconds.
pub const WEBHOOK_TOLERANCE_SECONDS: i64 = 300;

/// Page size for list requests (Stripe maximum).
const LIST_PAGE_SIZE: u32 = 100;

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Create a new Stripe client against the live API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, StripeError> {
        Self::with_base_url(api_key, STRIPE_API_BASE)
    }

    /// Create a new Stripe client against a custom base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, StripeError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// List one page of subscriptions of every status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn list_subscriptions_page(
        &self,
        starting_after: Option<&str>,
    ) -> Result<StripeList<Subscription>, StripeError> {
        let mut query = vec![
            ("status", "all".to_string()),
            ("limit", LIST_PAGE_SIZE.to_string()),
        ];
        if let Some(cursor) = starting_after {
            query.push(("starting_after", cursor.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/subscriptions", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .query(&query)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn list_subscriptions(&self) -> Result<Vec<ProcessorSubscription>, StripeError> {
        let mut subscriptions = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.list_subscriptions_page(cursor.as_deref()).await?;
            cursor = page.data.last().map(|sub| sub.id.clone());

            for sub in &page.data {
                match sub.to_processor_subscription() {
                    Some(processor) => subscriptions.push(processor),
                    None => tracing::debug!(
                        subscription_id = %sub.id,
                        "Skipping Stripe subscription without user_id metadata"
                    ),
                }
            }

            if !page.has_more || cursor.is_none() {
                break;
            }
        }

        tracing::debug!(count = subscriptions.len(), "Fetched Stripe subscriptions");
        Ok(subscriptions)
    }
}

/// Verify a `Stripe-Signature` header against the raw payload.
///
/// The header has the form `t=timestamp,v1=signature,v1=signature2,...`; any
/// matching `v1` signature is accepted if the timestamp is within
/// [`WEBHOOK_TOLERANCE_SECONDS`] of `now_unix`.
///
/// # Errors
///
/// Returns `StripeError::InvalidSignature` if no signature matches or the
/// timestamp is missing or stale.
pub fn verify_webhook_signature(
    payload: &str,
    signature: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature.split(',') {
        match part.split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;
    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| StripeError::InvalidSignature)?;
    if (now_unix - signed_at).abs() > WEBHOOK_TOLERANCE_SECONDS {
        return Err(StripeError::InvalidSignature);
    }

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"))
        .map_err(|e| StripeError::Configuration(e.to_string()))?;

    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(StripeError::InvalidSignature)
    }
}
