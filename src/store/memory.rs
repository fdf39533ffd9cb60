//! In-process store
//!
//! Every operation runs under one async mutex, which gives the same
//! all-or-nothing and no-oversell guarantees the Postgres store gets from
//! transactions and conditional updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    find_shortages, merge_requests, shortage_error, CartStore, CatalogStore, DashboardCounts,
    DashboardStore, InventoryStore, LedgerStore, OrderQuery, OrderWithItems, Page, PageRequest,
    ProductQuery, StockRequest, UserStore, UserSummary,
};
use crate::domain::aggregates::{
    ApplyOutcome, CartLine, CartLineDetail, CategoryPatch, NewCategory, NewOrder, NewProduct,
    NewUser, OrderItem, PaymentStatus, PaymentTransaction, PlacedOrder, Product, ProductCategory,
    ProductPatch, ProfileUpdate, StatusDecision, StatusUpdate, StockAdjustment, StockEffect, User,
};
use crate::domain::value_objects::{Patch, Quantity};
use crate::error::{EcommerceError, Result};

#[derive(Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    categories: HashMap<Uuid, ProductCategory>,
    cart_lines: Vec<CartLine>,
    transactions: HashMap<Uuid, PaymentTransaction>,
    items: Vec<OrderItem>,
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<Uuid, (String, DateTime<Utc>)>,
}

impl MemoryState {
    fn take_stock(&mut self, requests: &[StockRequest]) -> Result<Vec<Product>> {
        let merged = merge_requests(requests);
        let current: Vec<Product> = merged
            .iter()
            .filter_map(|(id, _)| self.products.get(id).cloned())
            .collect();
        let shortages = find_shortages(&current, &merged);
        if !shortages.is_empty() {
            return Err(shortage_error(shortages));
        }
        let now = Utc::now();
        let mut updated = Vec::with_capacity(merged.len());
        for (id, qty) in merged {
            if let Some(p) = self.products.get_mut(&id) {
                p.quantity -= qty as i32;
                p.updated_at = now;
                updated.push(p.clone());
            }
        }
        Ok(updated)
    }

    fn category_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.categories
            .values()
            .any(|c| c.name.eq_ignore_ascii_case(name.trim()) && Some(c.id) != except)
    }

    fn items_of(&self, transaction_id: Uuid) -> Vec<OrderItem> {
        self.items
            .iter()
            .filter(|i| i.transaction_id == transaction_id)
            .cloned()
            .collect()
    }

    /// Moves stock for a status change; mirrors the Postgres implementation.
    /// A restore that would overflow a counter fails before any product moves.
    fn adjust_stock(&mut self, transaction_id: Uuid, effect: StockEffect) -> Result<StockAdjustment> {
        let items = self.items_of(transaction_id);
        if effect == StockEffect::Restore {
            let mut restored: HashMap<Uuid, i32> = HashMap::new();
            for item in &items {
                let Some(product) = item.product_id.and_then(|id| self.products.get(&id)) else {
                    continue;
                };
                let current = restored.entry(product.id).or_insert(product.quantity);
                *current = current
                    .checked_add(item.quantity.max(0))
                    .ok_or_else(|| EcommerceError::validation("Quantity is too large"))?;
            }
        }
        let mut adjustment = StockAdjustment::default();
        let now = Utc::now();
        for item in items {
            let Some(product_id) = item.product_id else {
                continue;
            };
            let Some(product) = self.products.get_mut(&product_id) else {
                continue;
            };
            let qty = item.quantity.max(0);
            match effect {
                StockEffect::None => {}
                StockEffect::Restore => {
                    product.quantity = product.quantity.saturating_add(qty);
                    product.updated_at = now;
                    adjustment.restored.push((product_id, qty as u32));
                }
                StockEffect::Reserve => {
                    if product.quantity >= qty {
                        product.quantity -= qty;
                        product.updated_at = now;
                        adjustment.reserved.push((product_id, qty as u32));
                    } else {
                        adjustment.shortfalls.push(product_id);
                    }
                }
            }
        }
        Ok(adjustment)
    }
}

fn paginate<T>(mut rows: Vec<T>, page: PageRequest) -> Page<T> {
    let count = rows.len() as i64;
    let start = (page.offset() as usize).min(rows.len());
    let end = (start + page.limit as usize).min(rows.len());
    Page {
        rows: rows.drain(start..end).collect(),
        count,
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let state = self.state.lock().await;
        let needle = query.search.as_deref().map(|s| s.trim().to_lowercase());
        let mut rows: Vec<Product> = state
            .products
            .values()
            .filter(|p| query.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| match needle.as_deref() {
                None | Some("") => true,
                Some(n) => {
                    contains_ci(&p.name, n)
                        || p.description.as_deref().is_some_and(|d| contains_ci(d, n))
                }
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, query.page))
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn insert_product(&self, new: NewProduct) -> Result<Product> {
        let mut state = self.state.lock().await;
        if let Some(cat) = new.category_id {
            if !state.categories.contains_key(&cat) {
                return Err(EcommerceError::NotFound("Category"));
            }
        }
        let now = Utc::now();
        let product = Product {
            id: Uuid::now_v7(),
            name: new.name,
            description: new.description,
            price: new.price,
            quantity: new.quantity,
            category_id: new.category_id,
            image: new.image,
            popular: new.popular,
            spice_level: new.spice_level,
            features: new.features,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>> {
        let mut state = self.state.lock().await;
        if let Patch::Present(Some(cat)) = patch.category_id {
            if !state.categories.contains_key(&cat) {
                return Err(EcommerceError::NotFound("Category"));
            }
        }
        let Some(product) = state.products.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply(product);
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: Uuid) -> Result<Option<Product>> {
        let mut state = self.state.lock().await;
        let removed = state.products.remove(&id);
        if removed.is_some() {
            state.cart_lines.retain(|l| l.product_id != id);
            for item in state.items.iter_mut().filter(|i| i.product_id == Some(id)) {
                item.product_id = None;
            }
        }
        Ok(removed)
    }

    async fn list_categories(&self) -> Result<Vec<ProductCategory>> {
        let state = self.state.lock().await;
        let mut rows: Vec<ProductCategory> = state.categories.values().cloned().collect();
        rows.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(rows)
    }

    async fn category(&self, id: Uuid) -> Result<Option<ProductCategory>> {
        Ok(self.state.lock().await.categories.get(&id).cloned())
    }

    async fn category_by_name(&self, name: &str) -> Result<Option<ProductCategory>> {
        let state = self.state.lock().await;
        Ok(state
            .categories
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
            .cloned())
    }

    async fn insert_category(&self, new: NewCategory) -> Result<ProductCategory> {
        let mut state = self.state.lock().await;
        if state.category_name_taken(&new.name, None) {
            return Err(category_exists());
        }
        let now = Utc::now();
        let category = ProductCategory {
            id: Uuid::now_v7(),
            name: new.name.trim().to_string(),
            description: new.description,
            icon: new.icon,
            color: new.color,
            image: new.image,
            created_at: now,
            updated_at: now,
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, patch: CategoryPatch) -> Result<Option<ProductCategory>> {
        let mut state = self.state.lock().await;
        if let Some(name) = patch.name.as_ref().into_option() {
            if state.category_name_taken(name, Some(id)) {
                return Err(category_exists());
            }
        }
        let Some(category) = state.categories.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply(category);
        Ok(Some(category.clone()))
    }

    async fn delete_category(&self, id: Uuid) -> Result<Option<ProductCategory>> {
        let mut state = self.state.lock().await;
        let removed = state.categories.remove(&id);
        if removed.is_some() {
            let now = Utc::now();
            for p in state.products.values_mut().filter(|p| p.category_id == Some(id)) {
                p.category_id = None;
                p.updated_at = now;
            }
        }
        Ok(removed)
    }
}

fn category_exists() -> EcommerceError {
    EcommerceError::conflict("CATEGORY_NAME_EXISTS", "Category name already exists")
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn reduce_quantity(&self, product_id: Uuid, quantity: Quantity) -> Result<Product> {
        let mut state = self.state.lock().await;
        let mut updated = state.take_stock(&[StockRequest { product_id, quantity }])?;
        updated.pop().ok_or(EcommerceError::NotFound("Product"))
    }

    async fn restore_quantity(&self, product_id: Uuid, quantity: Quantity) -> Result<Product> {
        let mut state = self.state.lock().await;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or(EcommerceError::NotFound("Product"))?;
        product.quantity = product
            .quantity
            .checked_add(quantity.as_i32())
            .ok_or_else(|| EcommerceError::validation("Quantity is too large"))?;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn reduce_quantities(&self, requests: &[StockRequest]) -> Result<Vec<Product>> {
        self.state.lock().await.take_stock(requests)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart_lines(&self, cart_id: Uuid) -> Result<Vec<CartLineDetail>> {
        let state = self.state.lock().await;
        let mut lines: Vec<CartLineDetail> = state
            .cart_lines
            .iter()
            .filter(|l| l.cart_id == cart_id)
            .filter_map(|l| {
                let p = state.products.get(&l.product_id)?;
                Some(CartLineDetail {
                    id: l.id,
                    cart_id: l.cart_id,
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    product_name: p.name.clone(),
                    product_description: p.description.clone(),
                    current_price: p.price,
                    available_quantity: p.quantity,
                    image: p.image.clone(),
                    created_at: l.created_at,
                })
            })
            .collect();
        lines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(lines)
    }

    async fn add_line(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity, unit_price: Decimal) -> Result<CartLine> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&product_id) {
            return Err(EcommerceError::NotFound("Product"));
        }
        let now = Utc::now();
        if let Some(line) = state
            .cart_lines
            .iter_mut()
            .find(|l| l.cart_id == cart_id && l.product_id == product_id)
        {
            line.quantity = line
                .quantity
                .checked_add(quantity.as_i32())
                .ok_or_else(|| EcommerceError::validation("Quantity is too large"))?;
            line.updated_at = now;
            return Ok(line.clone());
        }
        let line = CartLine {
            id: Uuid::now_v7(),
            cart_id,
            product_id,
            quantity: quantity.as_i32(),
            unit_price,
            created_at: now,
            updated_at: now,
        };
        state.cart_lines.push(line.clone());
        Ok(line)
    }

    async fn set_line_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity) -> Result<Option<CartLine>> {
        let mut state = self.state.lock().await;
        Ok(state
            .cart_lines
            .iter_mut()
            .find(|l| l.cart_id == cart_id && l.product_id == product_id)
            .map(|line| {
                line.quantity = quantity.as_i32();
                line.updated_at = Utc::now();
                line.clone()
            }))
    }

    async fn remove_line(&self, cart_id: Uuid, product_id: Uuid) -> Result<Option<CartLine>> {
        let mut state = self.state.lock().await;
        let pos = state
            .cart_lines
            .iter()
            .position(|l| l.cart_id == cart_id && l.product_id == product_id);
        Ok(pos.map(|i| state.cart_lines.remove(i)))
    }

    async fn clear_cart(&self, cart_id: Uuid) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.cart_lines.len();
        state.cart_lines.retain(|l| l.cart_id != cart_id);
        Ok((before - state.cart_lines.len()) as u64)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn place_order(&self, order: &NewOrder) -> Result<PlacedOrder> {
        let mut state = self.state.lock().await;
        if state.transactions.contains_key(&order.transaction_id) {
            return Err(EcommerceError::conflict("TRANSACTION_EXISTS", "Transaction already exists"));
        }
        let requests: Vec<StockRequest> = order
            .lines
            .iter()
            .map(|l| StockRequest {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect();
        // Nothing below can fail once stock is taken.
        state.take_stock(&requests)?;
        let now = Utc::now();
        let transaction = order.transaction_record(now);
        let items = order.item_records(now);
        state.transactions.insert(transaction.id, transaction.clone());
        state.items.extend(items.iter().cloned());
        state.cart_lines.retain(|l| l.cart_id != order.cart_id);
        Ok(PlacedOrder { transaction, items })
    }

    async fn attach_reference(&self, transaction_id: Uuid, reference: &str) -> Result<Option<PaymentTransaction>> {
        let mut state = self.state.lock().await;
        let taken = state
            .transactions
            .values()
            .any(|t| t.id != transaction_id && t.reference_number.as_deref() == Some(reference));
        if taken {
            return Err(EcommerceError::conflict("REFERENCE_EXISTS", "Reference number already in use"));
        }
        Ok(state.transactions.get_mut(&transaction_id).map(|tx| {
            tx.reference_number = Some(reference.to_string());
            tx.updated_at = Utc::now();
            tx.clone()
        }))
    }

    async fn apply_status(&self, reference: &str, update: &StatusUpdate, restock: bool) -> Result<ApplyOutcome> {
        let mut state = self.state.lock().await;
        let Some(tx) = state
            .transactions
            .values()
            .find(|t| t.reference_number.as_deref() == Some(reference))
            .cloned()
        else {
            return Ok(ApplyOutcome::UnknownReference);
        };
        let stock = match tx.plan_status_change(update.status) {
            StatusDecision::Duplicate => return Ok(ApplyOutcome::Duplicate(tx)),
            StatusDecision::Rejected => {
                return Ok(ApplyOutcome::Rejected {
                    transaction: tx,
                    attempted: update.status,
                })
            }
            StatusDecision::Apply { stock } => stock,
        };
        let adjustment = if restock {
            state.adjust_stock(tx.id, stock)?
        } else {
            StockAdjustment::default()
        };
        let previous = tx.status;
        let mut updated = tx;
        updated.apply_update(update);
        state.transactions.insert(updated.id, updated.clone());
        Ok(ApplyOutcome::Applied {
            transaction: updated,
            previous,
            stock: adjustment,
        })
    }

    async fn transaction(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        Ok(self.state.lock().await.transactions.get(&id).cloned())
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<PaymentTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .find(|t| t.reference_number.as_deref() == Some(reference))
            .cloned())
    }

    async fn transactions_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<PaymentTransaction>> {
        let state = self.state.lock().await;
        let mut rows: Vec<PaymentTransaction> = state
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| !succeeded_only || t.status == PaymentStatus::Succeeded)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn list_transactions(&self, page: PageRequest) -> Result<Page<PaymentTransaction>> {
        let state = self.state.lock().await;
        let mut rows: Vec<PaymentTransaction> = state.transactions.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<OrderWithItems>> {
        let state = self.state.lock().await;
        let needle = query.search.as_deref().map(|s| s.trim().to_lowercase());
        let mut rows: Vec<OrderWithItems> = state
            .transactions
            .values()
            .map(|t| OrderWithItems {
                transaction: t.clone(),
                customer_email: state.users.get(&t.user_id).map(|u| u.email.clone()),
                items: state.items_of(t.id),
            })
            .filter(|o| !o.items.is_empty())
            .filter(|o| match needle.as_deref() {
                None | Some("") => true,
                Some(n) => {
                    let t = &o.transaction;
                    contains_ci(&t.contact_first_name, n)
                        || contains_ci(&t.contact_last_name, n)
                        || contains_ci(&t.contact_email, n)
                        || o.items.iter().any(|i| contains_ci(&i.product_name, n))
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.transaction
                .created_at
                .cmp(&a.transaction.created_at)
                .then(b.transaction.id.cmp(&a.transaction.id))
        });
        Ok(paginate(rows, query.page))
    }

    async fn delete_transaction(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let removed = state.transactions.remove(&id).is_some();
        state.items.retain(|i| i.transaction_id != id);
        Ok(removed)
    }

    async fn order_items(&self, transaction_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(self.state.lock().await.items_of(transaction_id))
    }

    async fn order_items_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<OrderItem>> {
        let state = self.state.lock().await;
        let mut rows: Vec<OrderItem> = state
            .items
            .iter()
            .filter(|i| {
                state.transactions.get(&i.transaction_id).is_some_and(|t| {
                    t.user_id == user_id && (!succeeded_only || t.status == PaymentStatus::Succeeded)
                })
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn order_item(&self, id: Uuid) -> Result<Option<OrderItem>> {
        let state = self.state.lock().await;
        Ok(state.items.iter().find(|i| i.id == id).cloned())
    }

    async fn set_delivery_status(&self, item_id: Uuid, status: &str) -> Result<Option<OrderItem>> {
        let mut state = self.state.lock().await;
        Ok(state.items.iter_mut().find(|i| i.id == item_id).map(|item| {
            item.delivery_status = status.to_string();
            item.updated_at = Utc::now();
            item.clone()
        }))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> Result<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == new.email) {
            return Err(EcommerceError::conflict("EMAIL_EXISTS", "Email is already registered"));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            role: new.role,
            cart_id: Uuid::now_v7(),
            billing_id: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn set_billing_id(&self, user_id: Uuid, billing_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).ok_or(EcommerceError::NotFound("User"))?;
        user.billing_id = Some(billing_id.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };
        if let Some(first_name) = &update.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(last_name) = &update.last_name {
            user.last_name = last_name.clone();
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn replace_password(&self, user_id: Uuid, password_hash: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        state.refresh_tokens.remove(&user_id);
        Ok(true)
    }

    async fn store_refresh_token(&self, user_id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) {
            return Err(EcommerceError::NotFound("User"));
        }
        state
            .refresh_tokens
            .insert(user_id, (token_hash.to_string(), expires_at));
        Ok(())
    }

    async fn refresh_token(&self, user_id: Uuid) -> Result<Option<(String, DateTime<Utc>)>> {
        Ok(self.state.lock().await.refresh_tokens.get(&user_id).cloned())
    }

    async fn revoke_refresh_token(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.refresh_tokens.remove(&user_id).is_some())
    }
}

#[async_trait]
impl DashboardStore for MemoryStore {
    async fn dashboard_counts(&self) -> Result<DashboardCounts> {
        let state = self.state.lock().await;
        let total_orders = state
            .transactions
            .keys()
            .filter(|id| state.items.iter().any(|i| i.transaction_id == **id))
            .count() as i64;
        Ok(DashboardCounts {
            total_products: state.products.len() as i64,
            total_categories: state.categories.len() as i64,
            total_orders,
            total_users: state.users.len() as i64,
            total_transactions: state.transactions.len() as i64,
            total_revenue: state
                .transactions
                .values()
                .filter(|t| t.status == PaymentStatus::Succeeded)
                .map(|t| t.amount)
                .sum(),
        })
    }

    async fn user_summary(&self, user_id: Uuid) -> Result<UserSummary> {
        let state = self.state.lock().await;
        let mut summary = UserSummary::default();
        for tx in state.transactions.values().filter(|t| t.user_id == user_id) {
            summary.total_transactions += 1;
            if tx.status == PaymentStatus::Succeeded {
                summary.succeeded_transactions += 1;
                summary.total_spent += tx.amount;
                summary.items_purchased += state
                    .items
                    .iter()
                    .filter(|i| i.transaction_id == tx.id)
                    .map(|i| i64::from(i.quantity))
                    .sum::<i64>();
            }
        }
        Ok(summary)
    }
}
