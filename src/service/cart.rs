//! Per-user cart
//!
//! A cart is the set of rows sharing the user's `cart_id`. Every call checks
//! that the caller owns the cart; a foreign cart looks like a missing one.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{CartLine, CartView};
use crate::domain::value_objects::Quantity;
use crate::error::{EcommerceError, Result};
use crate::storage::public_url;
use crate::store::{CartStore, CatalogStore, Store, UserStore};

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    app_url: String,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, app_url: impl Into<String>) -> Self {
        Self {
            store,
            app_url: app_url.into(),
        }
    }

    async fn authorize(&self, user_id: Uuid, cart_id: Uuid) -> Result<()> {
        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or(EcommerceError::NotFound("User"))?;
        if !user.owns_cart(cart_id) {
            tracing::debug!(%user_id, %cart_id, "cart access denied");
            return Err(EcommerceError::NotFound("Cart"));
        }
        Ok(())
    }

    pub async fn view(&self, user_id: Uuid, cart_id: Uuid) -> Result<CartView> {
        self.authorize(user_id, cart_id).await?;
        let lines = self.store.cart_lines(cart_id).await?;
        Ok(CartView::build(cart_id, lines, |key| public_url(&self.app_url, key)))
    }

    /// Adds `quantity` to the line, creating it at the current price if new.
    pub async fn add(&self, user_id: Uuid, cart_id: Uuid, product_id: Uuid, quantity: u32) -> Result<CartLine> {
        let quantity = Quantity::new(quantity)?;
        self.authorize(user_id, cart_id).await?;
        let product = self
            .store
            .product(product_id)
            .await?
            .ok_or(EcommerceError::NotFound("Product"))?;
        let line = self
            .store
            .add_line(cart_id, product_id, quantity, product.price)
            .await?;
        tracing::debug!(%cart_id, %product_id, quantity = line.quantity, "cart line added");
        Ok(line)
    }

    /// Replaces the quantity of an existing line.
    pub async fn update(&self, user_id: Uuid, cart_id: Uuid, product_id: Uuid, quantity: u32) -> Result<CartLine> {
        let quantity = Quantity::new(quantity)?;
        self.authorize(user_id, cart_id).await?;
        self.store
            .set_line_quantity(cart_id, product_id, quantity)
            .await?
            .ok_or(EcommerceError::NotFound("Cart item"))
    }

    pub async fn remove(&self, user_id: Uuid, cart_id: Uuid, product_id: Uuid) -> Result<CartLine> {
        self.authorize(user_id, cart_id).await?;
        self.store
            .remove_line(cart_id, product_id)
            .await?
            .ok_or(EcommerceError::NotFound("Cart item"))
    }

    pub async fn clear(&self, user_id: Uuid, cart_id: Uuid) -> Result<u64> {
        self.authorize(user_id, cart_id).await?;
        self.store.clear_cart(cart_id).await
    }
}
