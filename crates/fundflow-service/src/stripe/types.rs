//! Stripe API types.

use std::collections::HashMap;

use serde::Deserialize;

use fundflow_core::{ProcessorSubscription, SubscriptionStatus, UserId};

/// Paginated Stripe list.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Whether more pages follow.
    #[serde(default)]
    pub has_more: bool,
}

/// Stripe price object (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    /// Price ID.
    pub id: String,
    /// Unit amount in cents.
    #[serde(default)]
    pub unit_amount: Option<i64>,
    /// Currency (e.g., "usd").
    #[serde(default)]
    pub currency: Option<String>,
}

/// Stripe subscription item.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    /// Item ID.
    pub id: String,
    /// The recurring price.
    pub price: Price,
    /// Quantity, defaulting to one.
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// Stripe subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: String,
    /// Status (active, `past_due`, canceled, ...).
    pub status: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Metadata; `user_id` links the subscription to a fundflow user.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Subscription items.
    pub items: StripeList<SubscriptionItem>,
}

impl Subscription {
    /// Monthly amount in cents across all items.
    #[must_use]
    pub fn amount_cents(&self) -> i64 {
        self.items
            .data
            .iter()
            .map(|item| item.price.unit_amount.unwrap_or(0) * item.quantity.unwrap_or(1))
            .sum()
    }

    /// Status mapped to the local status model.
    #[must_use]
    pub fn local_status(&self) -> SubscriptionStatus {
        match self.status.as_str() {
            "active" | "trialing" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            _ => SubscriptionStatus::Cancelled,
        }
    }

    /// The linked fundflow user, if the metadata names a valid one.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.metadata.get("user_id").and_then(|s| s.parse().ok())
    }

    /// Convert to the processor-neutral form, if linked to a user.
    #[must_use]
    pub fn to_processor_subscription(&self) -> Option<ProcessorSubscription> {
        Some(ProcessorSubscription {
            user_id: self.user_id()?,
            subscription_id: self.id.clone(),
            status: self.local_status(),
            amount_cents: self.amount_cents(),
        })
    }
}

/// Stripe webhook event envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
}

/// Stripe event data container.
#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    /// Event object.
    pub object: serde_json::Value,
}

/// Stripe error response.
#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorBody,
}

/// Stripe error details.
#[derive(Debug, Deserialize)]
pub struct StripeErrorBody {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}
