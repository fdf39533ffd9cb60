//! Stock checks and conditional stock movements

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{OrderLineRequest, Product};
use crate::domain::value_objects::Quantity;
use crate::error::{EcommerceError, Result, StockShortage};
use crate::store::{find_shortages, merge_requests, CatalogStore, InventoryStore, StockRequest, Store};

/// Read-only answer to "can these lines be served right now".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StockCheck {
    pub available: bool,
    pub insufficient: Vec<StockShortage>,
    pub missing: Vec<Uuid>,
}

impl StockCheck {
    pub fn into_result(self) -> Result<()> {
        if !self.missing.is_empty() {
            return Err(EcommerceError::NotFound("Product"));
        }
        if !self.insufficient.is_empty() {
            return Err(EcommerceError::InsufficientStock(self.insufficient));
        }
        Ok(())
    }
}

fn requests(lines: &[OrderLineRequest]) -> Vec<StockRequest> {
    lines
        .iter()
        .map(|l| StockRequest {
            product_id: l.product_id,
            quantity: l.quantity,
        })
        .collect()
}

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn Store>,
}

impl InventoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn check_stock_availability(&self, lines: &[OrderLineRequest]) -> Result<StockCheck> {
        let merged = merge_requests(&requests(lines));
        let ids: Vec<Uuid> = merged.iter().map(|(id, _)| *id).collect();
        let products = self.store.products_by_ids(&ids).await?;
        let mut check = StockCheck::default();
        for shortage in find_shortages(&products, &merged) {
            if shortage.product_name.is_some() {
                check.insufficient.push(shortage);
            } else {
                check.missing.push(shortage.product_id);
            }
        }
        check.available = check.insufficient.is_empty() && check.missing.is_empty();
        Ok(check)
    }

    pub async fn reduce_quantity(&self, product_id: Uuid, quantity: u32) -> Result<Product> {
        let quantity = Quantity::new(quantity)?;
        let product = self.store.reduce_quantity(product_id, quantity).await?;
        tracing::debug!(%product_id, %quantity, remaining = product.quantity, "stock reduced");
        Ok(product)
    }

    pub async fn restore_quantity(&self, product_id: Uuid, quantity: u32) -> Result<Product> {
        let quantity = Quantity::new(quantity)?;
        let product = self.store.restore_quantity(product_id, quantity).await?;
        tracing::debug!(%product_id, %quantity, remaining = product.quantity, "stock restored");
        Ok(product)
    }

    /// All lines or none.
    pub async fn reduce_multiple_quantities(&self, lines: &[OrderLineRequest]) -> Result<Vec<Product>> {
        if lines.is_empty() {
            return Err(EcommerceError::validation("No items to reserve"));
        }
        self.store.reduce_quantities(&requests(lines)).await
    }
}
