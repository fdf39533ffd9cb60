//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::PaymentStatus;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderPlaced {
        transaction_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
        currency: String,
        item_count: usize,
    },
    PaymentStatusChanged {
        transaction_id: Uuid,
        reference_number: String,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    StockRestored {
        transaction_id: Uuid,
        products: Vec<(Uuid, u32)>,
    },
}

impl DomainEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "ecommerce.order.placed",
            Self::PaymentStatusChanged { .. } => "ecommerce.payment.status_changed",
            Self::StockRestored { .. } => "ecommerce.inventory.restored",
        }
    }
}
