//! Order Aggregate
//!
//! A `PaymentTransaction` is one checkout attempt; its `OrderItem`s are a
//! point-in-time copy of the purchased products (name, description, price)
//! so later catalog edits or deletions never rewrite order history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{Currency, Quantity};
use crate::error::{EcommerceError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Canceled,
    RequiresAction,
}

#[derive(Debug, Error)]
#[error("unknown value: {0}")]
pub struct UnknownVariant(pub String);

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::RequiresAction => "requires_action",
        }
    }

    /// Transition table for provider-driven updates.
    ///
    /// `succeeded` is terminal. Nothing moves back to `pending`. A failed or
    /// canceled attempt may still be paid later within the same session.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self, next) {
            (Pending, _) => true,
            (RequiresAction, Pending) => false,
            (RequiresAction, _) => true,
            (Failed | Canceled, Succeeded | Failed | Canceled) => true,
            (Failed | Canceled, _) => false,
            (Succeeded, _) => false,
        }
    }

    /// Whether units stay decremented from stock while in this status.
    pub fn holds_stock(self) -> bool {
        !matches!(self, Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            "requires_action" => Ok(Self::RequiresAction),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
    Overnight,
}

impl ShippingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Express => "express",
            Self::Overnight => "overnight",
        }
    }
}

impl FromStr for ShippingMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "express" => Ok(Self::Express),
            "overnight" => Ok(Self::Overnight),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl TryFrom<String> for ShippingMethod {
    type Error = UnknownVariant;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub method: ShippingMethod,
    pub cost: Decimal,
    pub days: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub raw_status: Option<String>,
    pub provider: String,
    pub reference_number: Option<String>,
    pub paid_amount: Option<Decimal>,
    pub paid_currency: Option<String>,
    pub contact_first_name: String,
    pub contact_last_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_zip_code: String,
    #[sqlx(try_from = "String")]
    pub shipping_method: ShippingMethod,
    pub shipping_cost: Decimal,
    pub shipping_days: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Decides how a provider update affects this transaction.
    pub fn plan_status_change(&self, next: PaymentStatus) -> StatusDecision {
        if self.status == next {
            return StatusDecision::Duplicate;
        }
        if !self.status.can_transition_to(next) {
            return StatusDecision::Rejected;
        }
        let stock = match (self.status.holds_stock(), next.holds_stock()) {
            (true, false) => StockEffect::Restore,
            (false, true) => StockEffect::Reserve,
            _ => StockEffect::None,
        };
        StatusDecision::Apply { stock }
    }

    /// Writes the update into this record; callers check `plan_status_change` first.
    pub fn apply_update(&mut self, update: &StatusUpdate) {
        self.status = update.status;
        if let Some(raw) = &update.raw_status {
            self.raw_status = Some(raw.clone());
        }
        if let Some(amount) = update.paid_amount {
            self.paid_amount = Some(amount);
        }
        if let Some(currency) = &update.paid_currency {
            self.paid_currency = Some(currency.clone());
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub product_description: Option<String>,
    pub product_price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
    pub delivery_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_DELIVERY_STATUS: &str = "pending";

/// A validated line the caller wants to buy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: Quantity,
}

/// Snapshot of one product as it will be written to `order_items`.
#[derive(Clone, Debug, PartialEq)]
pub struct LineSnapshot {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_description: Option<String>,
    pub unit_price: Decimal,
    pub quantity: Quantity,
}

impl LineSnapshot {
    pub fn of(product: &Product, quantity: Quantity) -> Self {
        Self {
            product_id: product.id,
            product_name: product.name.clone(),
            product_description: product.description.clone(),
            unit_price: product.price,
            quantity,
        }
    }

    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity.value())
    }
}

/// Everything the store needs to place an order atomically.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub cart_id: Uuid,
    pub currency: Currency,
    pub contact: ContactInfo,
    pub shipping: ShippingDetails,
    pub lines: Vec<LineSnapshot>,
}

impl NewOrder {
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(LineSnapshot::total).sum()
    }

    pub fn total(&self) -> Decimal {
        self.subtotal() + self.shipping.cost
    }

    pub fn validate(&self) -> Result<()> {
        if self.lines.is_empty() {
            return Err(EcommerceError::validation("Order must contain at least one item"));
        }
        if self.shipping.cost.is_sign_negative() {
            return Err(EcommerceError::validation("Shipping cost must not be negative"));
        }
        if self.total() <= Decimal::ZERO {
            return Err(EcommerceError::validation("Total amount must be greater than 0"));
        }
        Ok(())
    }

    pub fn transaction_record(&self, now: DateTime<Utc>) -> PaymentTransaction {
        PaymentTransaction {
            id: self.transaction_id,
            user_id: self.user_id,
            amount: self.total(),
            currency: self.currency.as_str().to_string(),
            status: PaymentStatus::Pending,
            raw_status: None,
            provider: "stripe".to_string(),
            reference_number: None,
            paid_amount: None,
            paid_currency: None,
            contact_first_name: self.contact.first_name.clone(),
            contact_last_name: self.contact.last_name.clone(),
            contact_email: self.contact.email.clone(),
            contact_phone: self.contact.phone.clone(),
            shipping_address: self.shipping.address.clone(),
            shipping_city: self.shipping.city.clone(),
            shipping_state: self.shipping.state.clone(),
            shipping_zip_code: self.shipping.zip_code.clone(),
            shipping_method: self.shipping.method,
            shipping_cost: self.shipping.cost,
            shipping_days: self.shipping.days.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn item_records(&self, now: DateTime<Utc>) -> Vec<OrderItem> {
        self.lines
            .iter()
            .map(|line| OrderItem {
                id: Uuid::now_v7(),
                transaction_id: self.transaction_id,
                product_id: Some(line.product_id),
                product_name: line.product_name.clone(),
                product_description: line.product_description.clone(),
                product_price: line.unit_price,
                quantity: line.quantity.as_i32(),
                total_price: line.total(),
                delivery_status: DEFAULT_DELIVERY_STATUS.to_string(),
                created_at: now,
                updated_at: now,
            })
            .collect()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PlacedOrder {
    pub transaction: PaymentTransaction,
    pub items: Vec<OrderItem>,
}

/// Provider-reported state for a reference number.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusUpdate {
    pub status: PaymentStatus,
    pub paid_amount: Option<Decimal>,
    pub paid_currency: Option<String>,
    pub raw_status: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: PaymentStatus) -> Self {
        Self {
            status,
            paid_amount: None,
            paid_currency: None,
            raw_status: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StockEffect {
    None,
    Restore,
    Reserve,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusDecision {
    Apply { stock: StockEffect },
    Duplicate,
    Rejected,
}

/// Result of applying a provider update.
#[derive(Clone, Debug)]
pub enum ApplyOutcome {
    Applied {
        transaction: PaymentTransaction,
        previous: PaymentStatus,
        stock: StockAdjustment,
    },
    Duplicate(PaymentTransaction),
    Rejected {
        transaction: PaymentTransaction,
        attempted: PaymentStatus,
    },
    UnknownReference,
}

/// Stock movement performed alongside a status change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StockAdjustment {
    pub restored: Vec<(Uuid, u32)>,
    pub reserved: Vec<(Uuid, u32)>,
    /// Products that could not be re-reserved.
    pub shortfalls: Vec<Uuid>,
}

impl StockAdjustment {
    pub fn is_empty(&self) -> bool {
        self.restored.is_empty() && self.reserved.is_empty() && self.shortfalls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    fn transaction(status: PaymentStatus) -> PaymentTransaction {
        let order = NewOrder {
            transaction_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            currency: Currency::new("usd").unwrap(),
            contact: ContactInfo::default(),
            shipping: ShippingDetails::default(),
            lines: vec![],
        };
        let mut tx = order.transaction_record(Utc::now());
        tx.status = status;
        tx
    }

    #[test]
    fn test_succeeded_is_terminal() {
        for next in [Pending, Failed, Canceled, RequiresAction] {
            assert!(!Succeeded.can_transition_to(next));
        }
        assert_eq!(transaction(Succeeded).plan_status_change(Succeeded), StatusDecision::Duplicate);
        assert_eq!(transaction(Succeeded).plan_status_change(Failed), StatusDecision::Rejected);
    }

    #[test]
    fn test_never_back_to_pending() {
        for from in [RequiresAction, Failed, Canceled] {
            assert!(!from.can_transition_to(Pending));
        }
        assert!(Failed.can_transition_to(Succeeded));
        assert!(!Failed.can_transition_to(RequiresAction));
    }

    #[test]
    fn test_stock_effects() {
        assert_eq!(
            transaction(Pending).plan_status_change(Failed),
            StatusDecision::Apply { stock: StockEffect::Restore }
        );
        assert_eq!(
            transaction(Failed).plan_status_change(Canceled),
            StatusDecision::Apply { stock: StockEffect::None }
        );
        assert_eq!(
            transaction(Canceled).plan_status_change(Succeeded),
            StatusDecision::Apply { stock: StockEffect::Reserve }
        );
        assert_eq!(
            transaction(Pending).plan_status_change(Succeeded),
            StatusDecision::Apply { stock: StockEffect::None }
        );
    }

    #[test]
    fn test_order_totals() {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Miso Ramen".into(),
            description: None,
            price: Decimal::new(1000, 2),
            quantity: 5,
            category_id: None,
            image: None,
            popular: false,
            spice_level: None,
            features: None,
            created_at: now,
            updated_at: now,
        };
        let order = NewOrder {
            transaction_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            currency: Currency::new("usd").unwrap(),
            contact: ContactInfo::default(),
            shipping: ShippingDetails {
                cost: Decimal::new(200, 2),
                ..Default::default()
            },
            lines: vec![LineSnapshot::of(&product, Quantity::new(3).unwrap())],
        };
        assert!(order.validate().is_ok());
        assert_eq!(order.total(), Decimal::new(3200, 2));
        let items = order.item_records(now);
        assert_eq!(items[0].total_price, Decimal::new(3000, 2));
        assert_eq!(items[0].delivery_status, "pending");
        assert_eq!(order.transaction_record(now).status, Pending);
    }

    #[test]
    fn test_empty_order_rejected() {
        let tx = transaction(Pending);
        assert_eq!(tx.amount, Decimal::ZERO);
        let order = NewOrder {
            transaction_id: tx.id,
            user_id: tx.user_id,
            cart_id: Uuid::new_v4(),
            currency: Currency::new("usd").unwrap(),
            contact: ContactInfo::default(),
            shipping: ShippingDetails::default(),
            lines: vec![],
        };
        assert!(matches!(order.validate(), Err(EcommerceError::Validation(_))));
    }

    #[test]
    fn test_status_strings_round_trip() {
        for s in [Pending, Succeeded, Failed, Canceled, RequiresAction] {
            assert_eq!(s.as_str().parse::<PaymentStatus>().unwrap(), s);
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
