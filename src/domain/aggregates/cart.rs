//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stored (cart_id, product_id) row.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartLine {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cart row joined with the current product record.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartLineDetail {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub product_name: String,
    pub product_description: Option<String>,
    pub current_price: Decimal,
    pub available_quantity: i32,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartItemView {
    #[serde(flatten)]
    pub line: CartLineDetail,
    pub image_url: Option<String>,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    pub cart_id: Uuid,
    pub items: Vec<CartItemView>,
    pub item_count: usize,
    pub subtotal: Decimal,
}

impl CartView {
    pub fn build(cart_id: Uuid, lines: Vec<CartLineDetail>, image_url: impl Fn(&str) -> String) -> Self {
        let items: Vec<CartItemView> = lines
            .into_iter()
            .map(|line| CartItemView {
                image_url: line.image.as_deref().map(&image_url),
                line_total: line.unit_price * Decimal::from(line.quantity),
                line,
            })
            .collect();
        let subtotal = items.iter().map(|i| i.line_total).sum();
        Self {
            cart_id,
            item_count: items.len(),
            items,
            subtotal,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
