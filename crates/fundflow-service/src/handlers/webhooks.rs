//! Stripe webhook handler.
//!
//! Subscription events keep local subscription records current. A funding
//! subscription also refreshes the user's open-cycle budget, which applies
//! increases immediately and defers decreases to the next cycle.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use fundflow_core::{LocalSubscription, SubscriptionStatus};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{verify_webhook_signature, Subscription, WebhookEvent};

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle Stripe webhooks.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(webhook_secret) = &state.config.stripe_webhook_secret {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

        verify_webhook_signature(&body, signature, webhook_secret, Utc::now().timestamp())
            .map_err(|e| {
                tracing::warn!(error = %e, "Invalid Stripe webhook signature");
                ApiError::BadRequest("Invalid webhook signature".into())
            })?;
    } else {
        // Development mode
        tracing::warn!("Stripe webhook_secret not configured - skipping signature verification");
    }

    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    match event.event_type.as_str() {
        "customer.subscription.created" | "customer.subscription.updated" => {
            handle_subscription_update(&state, event.data.object, false).await?;
        }
        "customer.subscription.deleted" => {
            handle_subscription_update(&state, event.data.object, true).await?;
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

async fn handle_subscription_update(
    state: &AppState,
    object: serde_json::Value,
    deleted: bool,
) -> Result<(), ApiError> {
    let subscription: Subscription = serde_json::from_value(object)
        .map_err(|e| ApiError::BadRequest(format!("Invalid subscription object: {e}")))?;

    // Acknowledge unlinked subscriptions so Stripe stops retrying them.
    let Some(user_id) = subscription.user_id() else {
        tracing::warn!(
            subscription_id = %subscription.id,
            "Subscription webhook without user_id metadata"
        );
        return Ok(());
    };

    let record = LocalSubscription {
        user_id,
        amount_cents: subscription.amount_cents(),
        status: if deleted {
            SubscriptionStatus::Cancelled
        } else {
            subscription.local_status()
        },
        processor_subscription_id: Some(subscription.id.clone()),
        updated_at: Utc::now(),
    };
    state.store.put_subscription(&record)?;

    tracing::info!(
        user_id = %user_id,
        subscription_id = %subscription.id,
        amount_cents = record.amount_cents,
        status = ?record.status,
        "Subscription updated"
    );

    if record.funding_cents() > 0 {
        state
            .ledger
            .refresh_budget(user_id, record.funding_cents())
            .await?;
    }

    Ok(())
}
