//! Checkout and provider webhook reconciliation
//!
//! Checkout places the order first, then opens a hosted session and attaches
//! its id as the transaction's reference number. Webhooks map provider events
//! onto `Ledger::apply_provider_status`.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::ledger::{Ledger, OrderRequest};
use crate::domain::aggregates::{
    ApplyOutcome, ContactInfo, OrderItem, OrderLineRequest, PaymentStatus, PaymentTransaction,
    PlacedOrder, ShippingDetails, StatusUpdate,
};
use crate::domain::value_objects::{Currency, Quantity};
use crate::error::{EcommerceError, Result};
use crate::payment::{
    CheckoutLine, CheckoutSessionRequest, PaymentGateway, WebhookEvent, WebhookKind,
};
use crate::store::{CartStore, Store, UserStore};

/// Provider limit on a single metadata value.
const METADATA_VALUE_LIMIT: usize = 500;

#[derive(Clone, Debug)]
pub struct CheckoutSettings {
    pub success_url: String,
    pub cancel_url: String,
    pub default_currency: Currency,
}

/// Lines default to the caller's cart when `lines` is `None`.
#[derive(Clone, Debug)]
pub struct CheckoutRequest {
    pub lines: Option<Vec<OrderLineRequest>>,
    pub contact: ContactInfo,
    pub shipping: ShippingDetails,
    pub currency: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckoutResult {
    pub transaction: PaymentTransaction,
    pub items: Vec<OrderItem>,
    pub session_id: String,
    pub url: String,
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    product_id: Option<Uuid>,
    name: &'a str,
    price: Decimal,
    quantity: i32,
}

#[derive(Clone)]
pub struct CheckoutService {
    ledger: Ledger,
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        ledger: Ledger,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            ledger,
            store,
            gateway,
            settings,
        }
    }

    pub async fn checkout(&self, user_id: Uuid, request: CheckoutRequest) -> Result<CheckoutResult> {
        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or(EcommerceError::NotFound("User"))?;
        let currency = self.settings.default_currency.clone();
        if let Some(code) = request.currency.as_deref() {
            if Currency::new(code)? != currency {
                return Err(EcommerceError::validation(format!(
                    "Only {currency} is accepted at checkout"
                )));
            }
        }
        let lines = match request.lines {
            Some(lines) => lines,
            None => self
                .store
                .cart_lines(user.cart_id)
                .await?
                .into_iter()
                .map(|l| {
                    Ok(OrderLineRequest {
                        product_id: l.product_id,
                        quantity: Quantity::new(u32::try_from(l.quantity).unwrap_or(0))?,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };
        if lines.is_empty() {
            return Err(EcommerceError::validation("Cart is empty"));
        }

        let placed = self
            .ledger
            .create_order(OrderRequest {
                user_id,
                lines,
                contact: request.contact,
                shipping: request.shipping,
                currency: currency.clone(),
            })
            .await?;

        let session_request = CheckoutSessionRequest {
            transaction_id: placed.transaction.id,
            user_id,
            currency: currency.clone(),
            customer_email: user.email.clone(),
            customer_id: user.billing_id.clone(),
            lines: checkout_lines(&placed, &currency)?,
            metadata: session_metadata(&placed),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
        };
        let session = match self.gateway.create_checkout_session(&session_request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    transaction_id = %placed.transaction.id,
                    error = %e,
                    "checkout session creation failed, transaction left pending without reference"
                );
                return Err(match e {
                    EcommerceError::PaymentGateway(_) => e,
                    other => EcommerceError::PaymentGateway(other.to_string()),
                });
            }
        };

        let transaction = self
            .ledger
            .attach_provider_reference(placed.transaction.id, &session.id)
            .await?;
        tracing::info!(
            transaction_id = %transaction.id,
            session_id = %session.id,
            "checkout session created"
        );
        Ok(CheckoutResult {
            transaction,
            items: placed.items,
            session_id: session.id,
            url: session.url,
        })
    }

    /// Verifies and dispatches a webhook delivery. Storage failures are
    /// returned so the provider redelivers; events that can never apply,
    /// such as a malformed object, are logged and acknowledged.
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<()> {
        let event = self.gateway.parse_webhook(payload, signature)?;
        tracing::info!(event_id = %event.id, kind = ?event.kind, "webhook received");
        match self.dispatch(&event).await {
            Ok(_) => Ok(()),
            Err(e) if e.status().is_server_error() => {
                tracing::error!(event_id = %event.id, kind = ?event.kind, error = %e, "webhook handling failed, asking for redelivery");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(event_id = %event.id, kind = ?event.kind, error = %e, "webhook event dropped");
                Ok(())
            }
        }
    }

    /// Maps a verified event onto the ledger. `None` means the event kind
    /// carries nothing to apply.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<Option<ApplyOutcome>> {
        let intent_status = match &event.kind {
            WebhookKind::CheckoutSessionCompleted => return self.session_completed(event).await,
            WebhookKind::PaymentIntentSucceeded => PaymentStatus::Succeeded,
            WebhookKind::PaymentIntentFailed => PaymentStatus::Failed,
            WebhookKind::PaymentIntentCanceled => PaymentStatus::Canceled,
            WebhookKind::PaymentIntentRequiresAction => PaymentStatus::RequiresAction,
            WebhookKind::Other(kind) => {
                tracing::debug!(event_id = %event.id, kind, "webhook event ignored");
                return Ok(None);
            }
        };

        let Some(reference) = self.intent_reference(event).await? else {
            tracing::warn!(event_id = %event.id, "payment intent does not match any transaction");
            return Ok(Some(ApplyOutcome::UnknownReference));
        };
        let mut update = StatusUpdate::new(intent_status);
        update.raw_status = event.object_str("status").map(str::to_string);
        if intent_status == PaymentStatus::Succeeded {
            update.paid_amount = event
                .object_i64("amount_received")
                .or_else(|| event.object_i64("amount"))
                .map(|minor| self.event_currency(event).from_minor_units(minor));
            update.paid_currency = event.object_str("currency").map(str::to_string);
        }
        let outcome = self.ledger.apply_provider_status(&reference, update).await?;
        Ok(Some(outcome))
    }

    async fn session_completed(&self, event: &WebhookEvent) -> Result<Option<ApplyOutcome>> {
        let reference = event
            .object_str("id")
            .ok_or_else(|| EcommerceError::validation("Checkout session without id"))?;
        let payment_status = event.object_str("payment_status");
        if payment_status == Some("unpaid") {
            // Delayed methods settle later through payment_intent events.
            tracing::info!(reference, "checkout completed before payment settled");
            return Ok(None);
        }
        let mut update = StatusUpdate::new(PaymentStatus::Succeeded);
        update.paid_amount = event
            .object_i64("amount_total")
            .map(|minor| self.event_currency(event).from_minor_units(minor));
        update.paid_currency = event.object_str("currency").map(str::to_string);
        update.raw_status = payment_status.map(str::to_string);
        let outcome = self.ledger.apply_provider_status(reference, update).await?;
        Ok(Some(outcome))
    }

    fn event_currency(&self, event: &WebhookEvent) -> Currency {
        event
            .object_str("currency")
            .and_then(|code| Currency::new(code).ok())
            .unwrap_or_else(|| self.settings.default_currency.clone())
    }

    /// The intent id when it is itself a known reference, otherwise the
    /// reference of the transaction named in the intent's metadata.
    async fn intent_reference(&self, event: &WebhookEvent) -> Result<Option<String>> {
        if let Some(intent_id) = event.object_str("id") {
            if self.ledger.transaction_by_reference(intent_id).await?.is_some() {
                return Ok(Some(intent_id.to_string()));
            }
        }
        let Some(transaction_id) = event
            .metadata("transaction_id")
            .and_then(|id| Uuid::parse_str(id).ok())
        else {
            return Ok(None);
        };
        match self.ledger.transaction(transaction_id).await {
            Ok(tx) => Ok(tx.reference_number),
            Err(EcommerceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn checkout_lines(placed: &PlacedOrder, currency: &Currency) -> Result<Vec<CheckoutLine>> {
    let mut lines = placed
        .items
        .iter()
        .map(|item| {
            Ok(CheckoutLine {
                name: item.product_name.clone(),
                description: item.product_description.clone(),
                unit_amount: currency.to_minor_units(item.product_price)?,
                quantity: u32::try_from(item.quantity)
                    .map_err(|_| EcommerceError::internal("negative item quantity"))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let tx = &placed.transaction;
    if tx.shipping_cost > Decimal::ZERO {
        lines.push(CheckoutLine {
            name: format!("Shipping ({})", tx.shipping_method.as_str()),
            description: tx.shipping_days.clone(),
            unit_amount: currency.to_minor_units(tx.shipping_cost)?,
            quantity: 1,
        });
    }
    Ok(lines)
}

fn session_metadata(placed: &PlacedOrder) -> Vec<(String, String)> {
    let tx = &placed.transaction;
    let mut metadata = vec![
        ("user_id".to_string(), tx.user_id.to_string()),
        ("transaction_id".to_string(), tx.id.to_string()),
    ];
    let manifest: Vec<ManifestEntry<'_>> = placed
        .items
        .iter()
        .map(|item| ManifestEntry {
            product_id: item.product_id,
            name: &item.product_name,
            price: item.product_price,
            quantity: item.quantity,
        })
        .collect();
    match serde_json::to_string(&manifest) {
        Ok(json) if json.len() <= METADATA_VALUE_LIMIT => {
            metadata.push(("products".to_string(), json));
        }
        Ok(json) => {
            tracing::debug!(transaction_id = %tx.id, size = json.len(), "product manifest too long for metadata");
        }
        Err(e) => tracing::warn!(transaction_id = %tx.id, error = %e, "failed to encode product manifest"),
    }
    let fields = [
        ("contact_first_name", tx.contact_first_name.as_str()),
        ("contact_last_name", tx.contact_last_name.as_str()),
        ("contact_email", tx.contact_email.as_str()),
        ("contact_phone", tx.contact_phone.as_str()),
        ("shipping_address", tx.shipping_address.as_str()),
        ("shipping_city", tx.shipping_city.as_str()),
        ("shipping_state", tx.shipping_state.as_str()),
        ("shipping_zip_code", tx.shipping_zip_code.as_str()),
        ("shipping_method", tx.shipping_method.as_str()),
        ("shipping_days", tx.shipping_days.as_deref().unwrap_or("")),
    ];
    metadata.extend(
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), truncate(v, METADATA_VALUE_LIMIT))),
    );
    metadata.push(("shipping_cost".to_string(), tx.shipping_cost.to_string()));
    metadata
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ShippingMethod;
    use chrono::Utc;
    use std::str::FromStr;

    fn usd() -> Currency {
        Currency::new("usd").unwrap()
    }

    fn placed(shipping_cost: &str) -> PlacedOrder {
        let now = Utc::now();
        let tx_id = Uuid::new_v4();
        PlacedOrder {
            transaction: PaymentTransaction {
                id: tx_id,
                user_id: Uuid::new_v4(),
                amount: Decimal::from_str("32.00").unwrap(),
                currency: "usd".into(),
                status: PaymentStatus::Pending,
                raw_status: None,
                provider: "stripe".into(),
                reference_number: None,
                paid_amount: None,
                paid_currency: None,
                contact_first_name: "Ada".into(),
                contact_last_name: "Lovelace".into(),
                contact_email: "ada@example.com".into(),
                contact_phone: "555".into(),
                shipping_address: "1 Main St".into(),
                shipping_city: "Town".into(),
                shipping_state: "ST".into(),
                shipping_zip_code: "12345".into(),
                shipping_method: ShippingMethod::Express,
                shipping_cost: Decimal::from_str(shipping_cost).unwrap(),
                shipping_days: Some("1-2".into()),
                created_at: now,
                updated_at: now,
            },
            items: vec![OrderItem {
                id: Uuid::new_v4(),
                transaction_id: tx_id,
                product_id: Some(Uuid::new_v4()),
                product_name: "Tea".into(),
                product_description: None,
                product_price: Decimal::from_str("10.00").unwrap(),
                quantity: 3,
                total_price: Decimal::from_str("30.00").unwrap(),
                delivery_status: "pending".into(),
                created_at: now,
                updated_at: now,
            }],
        }
    }

    #[test]
    fn test_checkout_lines_include_shipping() {
        let lines = checkout_lines(&placed("2.00"), &usd()).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].unit_amount, 1000);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[1].name, "Shipping (express)");
        assert_eq!(lines[1].unit_amount, 200);
    }

    #[test]
    fn test_free_shipping_has_no_line() {
        assert_eq!(checkout_lines(&placed("0"), &usd()).unwrap().len(), 1);
    }

    #[test]
    fn test_zero_decimal_currency_lines_use_whole_units() {
        let jpy = Currency::new("jpy").unwrap();
        let lines = checkout_lines(&placed("500"), &jpy).unwrap();
        assert_eq!(lines[0].unit_amount, 10);
        assert_eq!(lines[1].unit_amount, 500);
        assert!(checkout_lines(&placed("2.50"), &jpy).is_err());
    }

    #[test]
    fn test_metadata_carries_transaction_and_manifest() {
        let order = placed("2.00");
        let metadata = session_metadata(&order);
        let get = |k: &str| metadata.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
        assert_eq!(get("transaction_id"), Some(order.transaction.id.to_string()));
        assert_eq!(get("shipping_method").as_deref(), Some("express"));
        let manifest: serde_json::Value = serde_json::from_str(&get("products").unwrap()).unwrap();
        assert_eq!(manifest[0]["quantity"], 3);
    }
}
