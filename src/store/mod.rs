//! Persistence seams
//!
//! Each trait method is one unit of atomicity: implementations either apply
//! everything a method describes or nothing. `PgStore` backs production,
//! `MemoryStore` backs tests and database-less development runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{
    ApplyOutcome, CartLine, CartLineDetail, CategoryPatch, NewCategory, NewOrder, NewProduct,
    NewUser, OrderItem, PaymentTransaction, PlacedOrder, Product, ProductCategory, ProductPatch,
    ProfileUpdate, StatusUpdate, User,
};
use crate::domain::value_objects::Quantity;
use crate::error::{EcommerceError, Result, StockShortage};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Paginated rows plus the total match count.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub count: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            rows: self.rows.into_iter().map(f).collect(),
            count: self.count,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    /// Case-insensitive substring on name or description.
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub page: PageRequest,
}

#[derive(Clone, Debug, Default)]
pub struct OrderQuery {
    /// Case-insensitive substring on customer name/email or product name.
    pub search: Option<String>,
    pub page: PageRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: Uuid,
    pub quantity: Quantity,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub transaction: PaymentTransaction,
    pub customer_email: Option<String>,
    pub items: Vec<OrderItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DashboardCounts {
    pub total_products: i64,
    pub total_categories: i64,
    pub total_orders: i64,
    pub total_users: i64,
    pub total_transactions: i64,
    pub total_revenue: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UserSummary {
    pub total_transactions: i64,
    pub succeeded_transactions: i64,
    pub total_spent: Decimal,
    pub items_purchased: i64,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>>;
    async fn product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
    async fn insert_product(&self, new: NewProduct) -> Result<Product>;
    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>>;
    async fn delete_product(&self, id: Uuid) -> Result<Option<Product>>;

    async fn list_categories(&self) -> Result<Vec<ProductCategory>>;
    async fn category(&self, id: Uuid) -> Result<Option<ProductCategory>>;
    async fn category_by_name(&self, name: &str) -> Result<Option<ProductCategory>>;
    /// Fails with `Conflict` when the name is taken.
    async fn insert_category(&self, new: NewCategory) -> Result<ProductCategory>;
    async fn update_category(&self, id: Uuid, patch: CategoryPatch) -> Result<Option<ProductCategory>>;
    /// Referencing products keep existing with `category_id = NULL`.
    async fn delete_category(&self, id: Uuid) -> Result<Option<ProductCategory>>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Conditional decrement; `NotFound` or `InsufficientStock` on failure.
    async fn reduce_quantity(&self, product_id: Uuid, quantity: Quantity) -> Result<Product>;
    async fn restore_quantity(&self, product_id: Uuid, quantity: Quantity) -> Result<Product>;
    /// All-or-nothing over every request.
    async fn reduce_quantities(&self, requests: &[StockRequest]) -> Result<Vec<Product>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_lines(&self, cart_id: Uuid) -> Result<Vec<CartLineDetail>>;
    /// Creates the line or adds `quantity` to the existing one.
    async fn add_line(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity, unit_price: Decimal) -> Result<CartLine>;
    /// Replaces the quantity; `None` when the line does not exist.
    async fn set_line_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity) -> Result<Option<CartLine>>;
    async fn remove_line(&self, cart_id: Uuid, product_id: Uuid) -> Result<Option<CartLine>>;
    async fn clear_cart(&self, cart_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Decrements stock for every line, inserts the pending transaction and
    /// its items and clears the cart, all in one transaction.
    async fn place_order(&self, order: &NewOrder) -> Result<PlacedOrder>;
    async fn attach_reference(&self, transaction_id: Uuid, reference: &str) -> Result<Option<PaymentTransaction>>;
    /// Applies a provider update under a row lock following the transition
    /// table; with `restock` the matching stock movement runs in the same
    /// transaction.
    async fn apply_status(&self, reference: &str, update: &StatusUpdate, restock: bool) -> Result<ApplyOutcome>;

    async fn transaction(&self, id: Uuid) -> Result<Option<PaymentTransaction>>;
    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<PaymentTransaction>>;
    async fn transactions_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<PaymentTransaction>>;
    async fn list_transactions(&self, page: PageRequest) -> Result<Page<PaymentTransaction>>;
    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<OrderWithItems>>;
    /// Removes the transaction together with its items.
    async fn delete_transaction(&self, id: Uuid) -> Result<bool>;

    async fn order_items(&self, transaction_id: Uuid) -> Result<Vec<OrderItem>>;
    async fn order_items_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<OrderItem>>;
    async fn order_item(&self, id: Uuid) -> Result<Option<OrderItem>>;
    async fn set_delivery_status(&self, item_id: Uuid, status: &str) -> Result<Option<OrderItem>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is taken. Assigns a fresh cart id.
    async fn insert_user(&self, new: NewUser) -> Result<User>;
    async fn user(&self, id: Uuid) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn set_billing_id(&self, user_id: Uuid, billing_id: &str) -> Result<()>;
    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<Option<User>>;
    /// Stores the new hash and drops the refresh token together.
    async fn replace_password(&self, user_id: Uuid, password_hash: &str) -> Result<bool>;
    async fn store_refresh_token(&self, user_id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()>;
    async fn refresh_token(&self, user_id: Uuid) -> Result<Option<(String, DateTime<Utc>)>>;
    async fn revoke_refresh_token(&self, user_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait DashboardStore: Send + Sync {
    async fn dashboard_counts(&self) -> Result<DashboardCounts>;
    async fn user_summary(&self, user_id: Uuid) -> Result<UserSummary>;
}

/// Everything the services need from persistence.
pub trait Store: CatalogStore + InventoryStore + CartStore + LedgerStore + UserStore + DashboardStore {}

impl<T> Store for T where T: CatalogStore + InventoryStore + CartStore + LedgerStore + UserStore + DashboardStore {}

/// Sums the requested units per product, keeping first-seen order.
pub(crate) fn merge_requests(requests: &[StockRequest]) -> Vec<(Uuid, u32)> {
    let mut merged: Vec<(Uuid, u32)> = Vec::with_capacity(requests.len());
    for req in requests {
        match merged.iter_mut().find(|(id, _)| *id == req.product_id) {
            Some((_, qty)) => *qty = qty.saturating_add(req.quantity.value()),
            None => merged.push((req.product_id, req.quantity.value())),
        }
    }
    merged
}

/// Lines that cannot be served from `products`; missing products carry no name.
pub(crate) fn find_shortages(products: &[Product], requests: &[(Uuid, u32)]) -> Vec<StockShortage> {
    requests
        .iter()
        .filter_map(|&(product_id, requested)| {
            match products.iter().find(|p| p.id == product_id) {
                Some(p) if p.has_stock_for(requested) => None,
                Some(p) => Some(StockShortage {
                    product_id,
                    product_name: Some(p.name.clone()),
                    available: p.quantity,
                    requested,
                }),
                None => Some(StockShortage {
                    product_id,
                    product_name: None,
                    available: 0,
                    requested,
                }),
            }
        })
        .collect()
}

pub(crate) fn shortage_error(shortages: Vec<StockShortage>) -> EcommerceError {
    if shortages.iter().any(|s| s.product_name.is_none()) {
        EcommerceError::NotFound("Product")
    } else {
        EcommerceError::InsufficientStock(shortages)
    }
}

/// Error for a conditional decrement that touched no row. When the stock
/// read afterwards covers every line again (a restock landed in between),
/// all requested lines are reported with the stock seen now.
pub(crate) fn failed_decrement_error(products: &[Product], requests: &[(Uuid, u32)]) -> EcommerceError {
    let shortages = find_shortages(products, requests);
    if !shortages.is_empty() {
        return shortage_error(shortages);
    }
    let lines = requests
        .iter()
        .map(|&(product_id, requested)| {
            let product = products.iter().find(|p| p.id == product_id);
            StockShortage {
                product_id,
                product_name: product.map(|p| p.name.clone()),
                available: product.map_or(0, |p| p.quantity),
                requested,
            }
        })
        .collect();
    shortage_error(lines)
}

/// Escapes `%`, `_` and `\` for use inside an `ILIKE` pattern.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
