//! Payment provider seam
//!
//! `PaymentGateway` is what checkout and the webhook endpoint talk to.
//! `StripeGateway` is the production adapter; tests plug in a fake.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::value_objects::Currency;
use crate::error::{EcommerceError, Result};

pub mod signature;
pub mod stripe;

pub use stripe::StripeGateway;

/// One line of the hosted checkout page, amount in minor units.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckoutLine {
    pub name: String,
    pub description: Option<String>,
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Clone, Debug)]
pub struct CheckoutSessionRequest {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub customer_email: String,
    /// Provider customer id when the user already has one.
    pub customer_id: Option<String>,
    pub lines: Vec<CheckoutLine>,
    /// Opaque key/value pairs echoed back in webhook payloads.
    pub metadata: Vec<(String, String)>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookKind {
    CheckoutSessionCompleted,
    PaymentIntentSucceeded,
    PaymentIntentFailed,
    PaymentIntentCanceled,
    PaymentIntentRequiresAction,
    Other(String),
}

impl WebhookKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentIntentFailed,
            "payment_intent.canceled" => Self::PaymentIntentCanceled,
            "payment_intent.requires_action" => Self::PaymentIntentRequiresAction,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A verified provider event. `object` is the event's `data.object`.
#[derive(Clone, Debug)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: WebhookKind,
    pub object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

impl WebhookEvent {
    /// Parses an already verified payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| EcommerceError::validation(format!("Malformed webhook payload: {e}")))?;
        Ok(Self {
            id: raw.id,
            kind: WebhookKind::from_type(&raw.event_type),
            object: raw.data.object,
        })
    }

    pub fn object_str(&self, key: &str) -> Option<&str> {
        self.object.get(key).and_then(|v| v.as_str())
    }

    pub fn object_i64(&self, key: &str) -> Option<i64> {
        self.object.get(key).and_then(|v| v.as_i64())
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession>;

    /// Returns the provider's customer id.
    async fn create_customer(&self, email: &str, name: &str, user_id: Uuid) -> Result<String>;

    /// Verifies `signature` against the raw body, then parses it.
    fn parse_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent>;
}
