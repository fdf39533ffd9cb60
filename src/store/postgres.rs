//! PostgreSQL store
//!
//! Runtime-checked `sqlx::query_as` calls. Stock moves are conditional
//! updates so two buyers can never both take the last unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    failed_decrement_error, like_pattern, merge_requests, CartStore, CatalogStore,
    DashboardCounts, DashboardStore, InventoryStore, LedgerStore, OrderQuery, OrderWithItems,
    Page, PageRequest, ProductQuery, StockRequest, UserStore, UserSummary,
};
use crate::domain::aggregates::{
    ApplyOutcome, CartLine, CartLineDetail, CategoryPatch, NewCategory, NewOrder, NewProduct,
    NewUser, OrderItem, PaymentTransaction, PlacedOrder, Product, ProductCategory, ProductPatch,
    ProfileUpdate, StatusDecision, StatusUpdate, StockAdjustment, StockEffect, User,
};
use crate::domain::value_objects::Quantity;
use crate::error::{EcommerceError, Result};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const NUMERIC_OUT_OF_RANGE: &str = "22003";

fn is_violation(err: &sqlx::Error, code: &str) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(code))
}

fn category_exists() -> EcommerceError {
    EcommerceError::conflict("CATEGORY_NAME_EXISTS", "Category name already exists")
}

fn units(qty: u32) -> i32 {
    i32::try_from(qty).unwrap_or(i32::MAX)
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    #[sqlx(flatten)]
    transaction: PaymentTransaction,
    customer_email: Option<String>,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a conditional decrement touched no row.
    async fn stock_failure(&self, requests: &[(Uuid, u32)]) -> Result<EcommerceError> {
        let ids: Vec<Uuid> = requests.iter().map(|(id, _)| *id).collect();
        let products = self.products_by_ids(&ids).await?;
        Ok(failed_decrement_error(&products, requests))
    }

    /// Conditional decrements inside `tx`; `None` when any line fell short.
    async fn take_stock(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        requests: &[(Uuid, u32)],
    ) -> Result<Option<Vec<Product>>> {
        let mut updated = Vec::with_capacity(requests.len());
        for &(product_id, qty) in requests {
            let row = sqlx::query_as::<_, Product>(
                "UPDATE products SET quantity = quantity - $2, updated_at = NOW() \
                 WHERE id = $1 AND quantity >= $2 RETURNING *",
            )
            .bind(product_id)
            .bind(units(qty))
            .fetch_optional(&mut **tx)
            .await?;
            match row {
                Some(p) => updated.push(p),
                None => return Ok(None),
            }
        }
        Ok(Some(updated))
    }

    async fn adjust_stock(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        transaction_id: Uuid,
        effect: StockEffect,
    ) -> Result<StockAdjustment> {
        let mut adjustment = StockAdjustment::default();
        if effect == StockEffect::None {
            return Ok(adjustment);
        }
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE transaction_id = $1 ORDER BY product_id",
        )
        .bind(transaction_id)
        .fetch_all(&mut **tx)
        .await?;
        for item in items {
            let Some(product_id) = item.product_id else {
                continue;
            };
            let qty = item.quantity.max(0);
            let sql = match effect {
                StockEffect::Restore => {
                    "UPDATE products SET quantity = quantity + $2, updated_at = NOW() WHERE id = $1"
                }
                _ => {
                    "UPDATE products SET quantity = quantity - $2, updated_at = NOW() \
                     WHERE id = $1 AND quantity >= $2"
                }
            };
            let moved = sqlx::query(sql)
                .bind(product_id)
                .bind(qty)
                .execute(&mut **tx)
                .await?
                .rows_affected()
                > 0;
            match (effect, moved) {
                (StockEffect::Restore, true) => adjustment.restored.push((product_id, qty as u32)),
                (StockEffect::Reserve, true) => adjustment.reserved.push((product_id, qty as u32)),
                (StockEffect::Reserve, false) => {
                    let exists: (bool,) =
                        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
                            .bind(product_id)
                            .fetch_one(&mut **tx)
                            .await?;
                    if exists.0 {
                        adjustment.shortfalls.push(product_id);
                    }
                }
                _ => {}
            }
        }
        Ok(adjustment)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);
        let rows = sqlx::query_as::<_, Product>(
            "SELECT * FROM products \
             WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1) \
             AND ($2::uuid IS NULL OR category_id = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
        )
        .bind(&pattern)
        .bind(query.category_id)
        .bind(i64::from(query.page.limit))
        .bind(query.page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM products \
             WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1) \
             AND ($2::uuid IS NULL OR category_id = $2)",
        )
        .bind(&pattern)
        .bind(query.category_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Page { rows, count: count.0 })
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_product(&self, new: NewProduct) -> Result<Product> {
        sqlx::query_as::<_, Product>(
            "INSERT INTO products (id, name, description, price, quantity, category_id, image, popular, spice_level, features, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.quantity)
        .bind(new.category_id)
        .bind(&new.image)
        .bind(new.popular)
        .bind(new.spice_level)
        .bind(&new.features)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, FOREIGN_KEY_VIOLATION) {
                EcommerceError::NotFound("Category")
            } else {
                e.into()
            }
        })
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>> {
        let mut tx = self.pool.begin().await?;
        let Some(mut product) =
            sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
        else {
            return Ok(None);
        };
        patch.apply(&mut product);
        let updated = sqlx::query_as::<_, Product>(
            "UPDATE products SET name = $2, description = $3, price = $4, quantity = $5, category_id = $6, \
             image = $7, popular = $8, spice_level = $9, features = $10, updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.quantity)
        .bind(product.category_id)
        .bind(&product.image)
        .bind(product.popular)
        .bind(product.spice_level)
        .bind(&product.features)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_violation(&e, FOREIGN_KEY_VIOLATION) {
                EcommerceError::NotFound("Category")
            } else {
                e.into()
            }
        })?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>("DELETE FROM products WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_categories(&self) -> Result<Vec<ProductCategory>> {
        Ok(sqlx::query_as::<_, ProductCategory>(
            "SELECT * FROM product_categories ORDER BY LOWER(name)",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn category(&self, id: Uuid) -> Result<Option<ProductCategory>> {
        Ok(sqlx::query_as::<_, ProductCategory>("SELECT * FROM product_categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn category_by_name(&self, name: &str) -> Result<Option<ProductCategory>> {
        Ok(sqlx::query_as::<_, ProductCategory>(
            "SELECT * FROM product_categories WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_category(&self, new: NewCategory) -> Result<ProductCategory> {
        sqlx::query_as::<_, ProductCategory>(
            "INSERT INTO product_categories (id, name, description, icon, color, image, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(new.name.trim())
        .bind(&new.description)
        .bind(&new.icon)
        .bind(&new.color)
        .bind(&new.image)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, UNIQUE_VIOLATION) {
                category_exists()
            } else {
                e.into()
            }
        })
    }

    async fn update_category(&self, id: Uuid, patch: CategoryPatch) -> Result<Option<ProductCategory>> {
        let mut tx = self.pool.begin().await?;
        let Some(mut category) = sqlx::query_as::<_, ProductCategory>(
            "SELECT * FROM product_categories WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };
        patch.apply(&mut category);
        let updated = sqlx::query_as::<_, ProductCategory>(
            "UPDATE product_categories SET name = $2, description = $3, icon = $4, color = $5, image = $6, \
             updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(category.name.trim())
        .bind(&category.description)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(&category.image)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_violation(&e, UNIQUE_VIOLATION) {
                category_exists()
            } else {
                e.into()
            }
        })?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete_category(&self, id: Uuid) -> Result<Option<ProductCategory>> {
        // products.category_id is ON DELETE SET NULL
        Ok(sqlx::query_as::<_, ProductCategory>(
            "DELETE FROM product_categories WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn reduce_quantity(&self, product_id: Uuid, quantity: Quantity) -> Result<Product> {
        let row = sqlx::query_as::<_, Product>(
            "UPDATE products SET quantity = quantity - $2, updated_at = NOW() \
             WHERE id = $1 AND quantity >= $2 RETURNING *",
        )
        .bind(product_id)
        .bind(quantity.as_i32())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(p) => Ok(p),
            None => Err(self.stock_failure(&[(product_id, quantity.value())]).await?),
        }
    }

    async fn restore_quantity(&self, product_id: Uuid, quantity: Quantity) -> Result<Product> {
        sqlx::query_as::<_, Product>(
            "UPDATE products SET quantity = quantity + $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(product_id)
        .bind(quantity.as_i32())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, NUMERIC_OUT_OF_RANGE) {
                EcommerceError::validation("Quantity is too large")
            } else {
                e.into()
            }
        })?
        .ok_or(EcommerceError::NotFound("Product"))
    }

    async fn reduce_quantities(&self, requests: &[StockRequest]) -> Result<Vec<Product>> {
        let mut merged = merge_requests(requests);
        // Fixed lock order across concurrent callers.
        merged.sort_by_key(|(id, _)| *id);
        let mut tx = self.pool.begin().await?;
        match Self::take_stock(&mut tx, &merged).await? {
            Some(updated) => {
                tx.commit().await?;
                Ok(updated)
            }
            None => {
                tx.rollback().await?;
                Err(self.stock_failure(&merged).await?)
            }
        }
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn cart_lines(&self, cart_id: Uuid) -> Result<Vec<CartLineDetail>> {
        Ok(sqlx::query_as::<_, CartLineDetail>(
            "SELECT c.id, c.cart_id, c.product_id, c.quantity, c.unit_price, \
             p.name AS product_name, p.description AS product_description, p.price AS current_price, \
             p.quantity AS available_quantity, p.image, c.created_at \
             FROM carts c JOIN products p ON p.id = c.product_id \
             WHERE c.cart_id = $1 ORDER BY c.created_at, c.id",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_line(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity, unit_price: Decimal) -> Result<CartLine> {
        sqlx::query_as::<_, CartLine>(
            "INSERT INTO carts (id, cart_id, product_id, quantity, unit_price, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) \
             ON CONFLICT (cart_id, product_id) \
             DO UPDATE SET quantity = carts.quantity + EXCLUDED.quantity, updated_at = NOW() \
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity.as_i32())
        .bind(unit_price)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, FOREIGN_KEY_VIOLATION) {
                EcommerceError::NotFound("Product")
            } else if is_violation(&e, NUMERIC_OUT_OF_RANGE) {
                EcommerceError::validation("Quantity is too large")
            } else {
                e.into()
            }
        })
    }

    async fn set_line_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity) -> Result<Option<CartLine>> {
        Ok(sqlx::query_as::<_, CartLine>(
            "UPDATE carts SET quantity = $3, updated_at = NOW() \
             WHERE cart_id = $1 AND product_id = $2 RETURNING *",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity.as_i32())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn remove_line(&self, cart_id: Uuid, product_id: Uuid) -> Result<Option<CartLine>> {
        Ok(sqlx::query_as::<_, CartLine>(
            "DELETE FROM carts WHERE cart_id = $1 AND product_id = $2 RETURNING *",
        )
        .bind(cart_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn clear_cart(&self, cart_id: Uuid) -> Result<u64> {
        Ok(sqlx::query("DELETE FROM carts WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?
            .rows_affected())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn place_order(&self, order: &NewOrder) -> Result<PlacedOrder> {
        let requests: Vec<StockRequest> = order
            .lines
            .iter()
            .map(|l| StockRequest {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect();
        let mut merged = merge_requests(&requests);
        merged.sort_by_key(|(id, _)| *id);

        let mut tx = self.pool.begin().await?;
        if Self::take_stock(&mut tx, &merged).await?.is_none() {
            tx.rollback().await?;
            return Err(self.stock_failure(&merged).await?);
        }

        let now = Utc::now();
        let record = order.transaction_record(now);
        let transaction = sqlx::query_as::<_, PaymentTransaction>(
            "INSERT INTO payment_transactions (id, user_id, amount, currency, status, raw_status, provider, \
             reference_number, paid_amount, paid_currency, contact_first_name, contact_last_name, contact_email, \
             contact_phone, shipping_address, shipping_city, shipping_state, shipping_zip_code, shipping_method, \
             shipping_cost, shipping_days, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NULL, $6, NULL, NULL, NULL, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $18) \
             RETURNING *",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.status.as_str())
        .bind(&record.provider)
        .bind(&record.contact_first_name)
        .bind(&record.contact_last_name)
        .bind(&record.contact_email)
        .bind(&record.contact_phone)
        .bind(&record.shipping_address)
        .bind(&record.shipping_city)
        .bind(&record.shipping_state)
        .bind(&record.shipping_zip_code)
        .bind(record.shipping_method.as_str())
        .bind(record.shipping_cost)
        .bind(&record.shipping_days)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let items = order.item_records(now);
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO order_items (id, transaction_id, product_id, product_name, product_description, \
             product_price, quantity, total_price, delivery_status, created_at, updated_at) ",
        );
        builder.push_values(items.iter(), |mut b, item| {
            b.push_bind(item.id)
                .push_bind(item.transaction_id)
                .push_bind(item.product_id)
                .push_bind(&item.product_name)
                .push_bind(&item.product_description)
                .push_bind(item.product_price)
                .push_bind(item.quantity)
                .push_bind(item.total_price)
                .push_bind(&item.delivery_status)
                .push_bind(item.created_at)
                .push_bind(item.updated_at);
        });
        builder.push(" RETURNING *");
        let items = builder
            .build_query_as::<OrderItem>()
            .fetch_all(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM carts WHERE cart_id = $1")
            .bind(order.cart_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(PlacedOrder { transaction, items })
    }

    async fn attach_reference(&self, transaction_id: Uuid, reference: &str) -> Result<Option<PaymentTransaction>> {
        sqlx::query_as::<_, PaymentTransaction>(
            "UPDATE payment_transactions SET reference_number = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(transaction_id)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, UNIQUE_VIOLATION) {
                EcommerceError::conflict("REFERENCE_EXISTS", "Reference number already in use")
            } else {
                e.into()
            }
        })
    }

    async fn apply_status(&self, reference: &str, update: &StatusUpdate, restock: bool) -> Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;
        let Some(current) = sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE reference_number = $1 FOR UPDATE",
        )
        .bind(reference)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(ApplyOutcome::UnknownReference);
        };

        let effect = match current.plan_status_change(update.status) {
            StatusDecision::Duplicate => return Ok(ApplyOutcome::Duplicate(current)),
            StatusDecision::Rejected => {
                return Ok(ApplyOutcome::Rejected {
                    transaction: current,
                    attempted: update.status,
                })
            }
            StatusDecision::Apply { stock } => stock,
        };

        let stock = if restock {
            Self::adjust_stock(&mut tx, current.id, effect).await?
        } else {
            StockAdjustment::default()
        };

        let transaction = sqlx::query_as::<_, PaymentTransaction>(
            "UPDATE payment_transactions SET status = $2, \
             raw_status = COALESCE($3, raw_status), \
             paid_amount = COALESCE($4, paid_amount), \
             paid_currency = COALESCE($5, paid_currency), \
             updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(current.id)
        .bind(update.status.as_str())
        .bind(&update.raw_status)
        .bind(update.paid_amount)
        .bind(&update.paid_currency)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(ApplyOutcome::Applied {
            transaction,
            previous: current.status,
            stock,
        })
    }

    async fn transaction(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        Ok(sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<PaymentTransaction>> {
        Ok(sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE reference_number = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn transactions_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<PaymentTransaction>> {
        Ok(sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE user_id = $1 AND (NOT $2 OR status = 'succeeded') \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(succeeded_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_transactions(&self, page: PageRequest) -> Result<Page<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payment_transactions")
            .fetch_one(&self.pool)
            .await?;
        Ok(Page { rows, count: count.0 })
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<OrderWithItems>> {
        const FILTER: &str = "EXISTS (SELECT 1 FROM order_items oi WHERE oi.transaction_id = t.id) \
             AND ($1::text IS NULL OR t.contact_first_name ILIKE $1 OR t.contact_last_name ILIKE $1 \
             OR t.contact_email ILIKE $1 OR EXISTS (SELECT 1 FROM order_items oi \
             WHERE oi.transaction_id = t.id AND oi.product_name ILIKE $1))";
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let orders = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT t.*, u.email AS customer_email FROM payment_transactions t \
             LEFT JOIN users u ON u.id = t.user_id WHERE {FILTER} \
             ORDER BY t.created_at DESC, t.id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(&pattern)
        .bind(i64::from(query.page.limit))
        .bind(query.page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        let count: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM payment_transactions t WHERE {FILTER}"
        ))
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.transaction.id).collect();
        let mut items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE transaction_id = ANY($1) ORDER BY created_at, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let rows = orders
            .into_iter()
            .map(|o| {
                let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut items)
                    .into_iter()
                    .partition(|i| i.transaction_id == o.transaction.id);
                items = rest;
                OrderWithItems {
                    transaction: o.transaction,
                    customer_email: o.customer_email,
                    items: mine,
                }
            })
            .collect();
        Ok(Page { rows, count: count.0 })
    }

    async fn delete_transaction(&self, id: Uuid) -> Result<bool> {
        // order_items.transaction_id is ON DELETE CASCADE
        Ok(sqlx::query("DELETE FROM payment_transactions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0)
    }

    async fn order_items(&self, transaction_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE transaction_id = $1 ORDER BY created_at, id",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn order_items_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<OrderItem>> {
        Ok(sqlx::query_as::<_, OrderItem>(
            "SELECT oi.* FROM order_items oi JOIN payment_transactions t ON t.id = oi.transaction_id \
             WHERE t.user_id = $1 AND (NOT $2 OR t.status = 'succeeded') \
             ORDER BY oi.created_at DESC, oi.id DESC",
        )
        .bind(user_id)
        .bind(succeeded_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn order_item(&self, id: Uuid) -> Result<Option<OrderItem>> {
        Ok(sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_delivery_status(&self, item_id: Uuid, status: &str) -> Result<Option<OrderItem>> {
        Ok(sqlx::query_as::<_, OrderItem>(
            "UPDATE order_items SET delivery_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(item_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, new: NewUser) -> Result<User> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, role, cart_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.role.as_str())
        .bind(Uuid::now_v7())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, UNIQUE_VIOLATION) {
                EcommerceError::conflict("EMAIL_EXISTS", "Email is already registered")
            } else {
                e.into()
            }
        })
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_billing_id(&self, user_id: Uuid, billing_id: &str) -> Result<()> {
        let done = sqlx::query("UPDATE users SET billing_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(billing_id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(EcommerceError::NotFound("User"));
        }
        Ok(())
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "UPDATE users SET first_name = COALESCE($2, first_name), \
             last_name = COALESCE($3, last_name), updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn replace_password(&self, user_id: Uuid, password_hash: &str) -> Result<bool> {
        Ok(sqlx::query(
            "UPDATE users SET password_hash = $2, refresh_token_hash = NULL, \
             refresh_expires_at = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0)
    }

    async fn store_refresh_token(&self, user_id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let done = sqlx::query(
            "UPDATE users SET refresh_token_hash = $2, refresh_expires_at = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(EcommerceError::NotFound("User"));
        }
        Ok(())
    }

    async fn refresh_token(&self, user_id: Uuid) -> Result<Option<(String, DateTime<Utc>)>> {
        let row: Option<(Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT refresh_token_hash, refresh_expires_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some((Some(hash), Some(expires_at))) => Some((hash, expires_at)),
            _ => None,
        })
    }

    async fn revoke_refresh_token(&self, user_id: Uuid) -> Result<bool> {
        Ok(sqlx::query(
            "UPDATE users SET refresh_token_hash = NULL, refresh_expires_at = NULL \
             WHERE id = $1 AND refresh_token_hash IS NOT NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0)
    }
}

#[async_trait]
impl DashboardStore for PgStore {
    async fn dashboard_counts(&self) -> Result<DashboardCounts> {
        let row: (i64, i64, i64, i64, i64, Decimal) = sqlx::query_as(
            "SELECT \
             (SELECT COUNT(*) FROM products), \
             (SELECT COUNT(*) FROM product_categories), \
             (SELECT COUNT(DISTINCT transaction_id) FROM order_items), \
             (SELECT COUNT(*) FROM users), \
             (SELECT COUNT(*) FROM payment_transactions), \
             (SELECT COALESCE(SUM(amount), 0) FROM payment_transactions WHERE status = 'succeeded')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(DashboardCounts {
            total_products: row.0,
            total_categories: row.1,
            total_orders: row.2,
            total_users: row.3,
            total_transactions: row.4,
            total_revenue: row.5,
        })
    }

    async fn user_summary(&self, user_id: Uuid) -> Result<UserSummary> {
        let (total, succeeded, spent): (i64, i64, Decimal) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'succeeded'), \
             COALESCE(SUM(amount) FILTER (WHERE status = 'succeeded'), 0) \
             FROM payment_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let items: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(oi.quantity), 0)::BIGINT FROM order_items oi \
             JOIN payment_transactions t ON t.id = oi.transaction_id \
             WHERE t.user_id = $1 AND t.status = 'succeeded'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserSummary {
            total_transactions: total,
            succeeded_transactions: succeeded,
            total_spent: spent,
            items_purchased: items.0,
        })
    }
}
