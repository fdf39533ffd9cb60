//! Store wrapper that fails chosen calls once, for redelivery tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use storefront::domain::aggregates::{
    ApplyOutcome, CartLine, CartLineDetail, CategoryPatch, NewCategory, NewOrder, NewProduct,
    NewUser, OrderItem, PaymentTransaction, PlacedOrder, Product, ProductCategory, ProductPatch,
    ProfileUpdate, StatusUpdate, User,
};
use storefront::domain::value_objects::Quantity;
use storefront::error::{EcommerceError, Result};
use storefront::store::{
    CartStore, CatalogStore, DashboardCounts, DashboardStore, InventoryStore, LedgerStore,
    MemoryStore, OrderQuery, OrderWithItems, Page, PageRequest, ProductQuery, StockRequest,
    UserStore, UserSummary,
};

/// Delegates to a `MemoryStore`; the next `apply_status_failures` calls to
/// `apply_status` fail with a storage error before touching any state.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    apply_status_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>, apply_status_failures: usize) -> Self {
        Self {
            inner,
            apply_status_failures: AtomicUsize::new(apply_status_failures),
        }
    }

    fn take_failure(&self) -> bool {
        self.apply_status_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        self.inner.list_products(query).await
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        self.inner.product(id).await
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        self.inner.products_by_ids(ids).await
    }

    async fn insert_product(&self, new: NewProduct) -> Result<Product> {
        self.inner.insert_product(new).await
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>> {
        self.inner.update_product(id, patch).await
    }

    async fn delete_product(&self, id: Uuid) -> Result<Option<Product>> {
        self.inner.delete_product(id).await
    }

    async fn list_categories(&self) -> Result<Vec<ProductCategory>> {
        self.inner.list_categories().await
    }

    async fn category(&self, id: Uuid) -> Result<Option<ProductCategory>> {
        self.inner.category(id).await
    }

    async fn category_by_name(&self, name: &str) -> Result<Option<ProductCategory>> {
        self.inner.category_by_name(name).await
    }

    async fn insert_category(&self, new: NewCategory) -> Result<ProductCategory> {
        self.inner.insert_category(new).await
    }

    async fn update_category(&self, id: Uuid, patch: CategoryPatch) -> Result<Option<ProductCategory>> {
        self.inner.update_category(id, patch).await
    }

    async fn delete_category(&self, id: Uuid) -> Result<Option<ProductCategory>> {
        self.inner.delete_category(id).await
    }
}

#[async_trait]
impl InventoryStore for FlakyStore {
    async fn reduce_quantity(&self, product_id: Uuid, quantity: Quantity) -> Result<Product> {
        self.inner.reduce_quantity(product_id, quantity).await
    }

    async fn restore_quantity(&self, product_id: Uuid, quantity: Quantity) -> Result<Product> {
        self.inner.restore_quantity(product_id, quantity).await
    }

    async fn reduce_quantities(&self, requests: &[StockRequest]) -> Result<Vec<Product>> {
        self.inner.reduce_quantities(requests).await
    }
}

#[async_trait]
impl CartStore for FlakyStore {
    async fn cart_lines(&self, cart_id: Uuid) -> Result<Vec<CartLineDetail>> {
        self.inner.cart_lines(cart_id).await
    }

    async fn add_line(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity, unit_price: Decimal) -> Result<CartLine> {
        self.inner.add_line(cart_id, product_id, quantity, unit_price).await
    }

    async fn set_line_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity) -> Result<Option<CartLine>> {
        self.inner.set_line_quantity(cart_id, product_id, quantity).await
    }

    async fn remove_line(&self, cart_id: Uuid, product_id: Uuid) -> Result<Option<CartLine>> {
        self.inner.remove_line(cart_id, product_id).await
    }

    async fn clear_cart(&self, cart_id: Uuid) -> Result<u64> {
        self.inner.clear_cart(cart_id).await
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn place_order(&self, order: &NewOrder) -> Result<PlacedOrder> {
        self.inner.place_order(order).await
    }

    async fn attach_reference(&self, transaction_id: Uuid, reference: &str) -> Result<Option<PaymentTransaction>> {
        self.inner.attach_reference(transaction_id, reference).await
    }

    async fn apply_status(&self, reference: &str, update: &StatusUpdate, restock: bool) -> Result<ApplyOutcome> {
        if self.take_failure() {
            return Err(EcommerceError::Storage("connection reset".into()));
        }
        self.inner.apply_status(reference, update, restock).await
    }

    async fn transaction(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        self.inner.transaction(id).await
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<PaymentTransaction>> {
        self.inner.transaction_by_reference(reference).await
    }

    async fn transactions_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<PaymentTransaction>> {
        self.inner.transactions_for_user(user_id, succeeded_only).await
    }

    async fn list_transactions(&self, page: PageRequest) -> Result<Page<PaymentTransaction>> {
        self.inner.list_transactions(page).await
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<OrderWithItems>> {
        self.inner.list_orders(query).await
    }

    async fn delete_transaction(&self, id: Uuid) -> Result<bool> {
        self.inner.delete_transaction(id).await
    }

    async fn order_items(&self, transaction_id: Uuid) -> Result<Vec<OrderItem>> {
        self.inner.order_items(transaction_id).await
    }

    async fn order_items_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<OrderItem>> {
        self.inner.order_items_for_user(user_id, succeeded_only).await
    }

    async fn order_item(&self, id: Uuid) -> Result<Option<OrderItem>> {
        self.inner.order_item(id).await
    }

    async fn set_delivery_status(&self, item_id: Uuid, status: &str) -> Result<Option<OrderItem>> {
        self.inner.set_delivery_status(item_id, status).await
    }
}

#[async_trait]
impl UserStore for FlakyStore {
    async fn insert_user(&self, new: NewUser) -> Result<User> {
        self.inner.insert_user(new).await
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        self.inner.user(id).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.inner.user_by_email(email).await
    }

    async fn set_billing_id(&self, user_id: Uuid, billing_id: &str) -> Result<()> {
        self.inner.set_billing_id(user_id, billing_id).await
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<Option<User>> {
        self.inner.update_profile(user_id, update).await
    }

    async fn replace_password(&self, user_id: Uuid, password_hash: &str) -> Result<bool> {
        self.inner.replace_password(user_id, password_hash).await
    }

    async fn store_refresh_token(&self, user_id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.inner.store_refresh_token(user_id, token_hash, expires_at).await
    }

    async fn refresh_token(&self, user_id: Uuid) -> Result<Option<(String, DateTime<Utc>)>> {
        self.inner.refresh_token(user_id).await
    }

    async fn revoke_refresh_token(&self, user_id: Uuid) -> Result<bool> {
        self.inner.revoke_refresh_token(user_id).await
    }
}

#[async_trait]
impl DashboardStore for FlakyStore {
    async fn dashboard_counts(&self) -> Result<DashboardCounts> {
        self.inner.dashboard_counts().await
    }

    async fn user_summary(&self, user_id: Uuid) -> Result<UserSummary> {
        self.inner.user_summary(user_id).await
    }
}
