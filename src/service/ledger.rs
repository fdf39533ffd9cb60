//! Order/transaction ledger
//!
//! Orders are placed in one store call (stock, transaction, items, cart).
//! Provider updates go through the transition table on
//! `PaymentTransaction::plan_status_change`, so replays are no-ops and a
//! `succeeded` transaction never regresses.

use std::sync::Arc;
use uuid::Uuid;

use super::inventory::InventoryService;
use crate::domain::aggregates::{
    ApplyOutcome, ContactInfo, LineSnapshot, NewOrder, OrderItem, OrderLineRequest,
    PaymentTransaction, PlacedOrder, ShippingDetails, StatusUpdate,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Currency, Quantity};
use crate::error::{EcommerceError, Result};
use crate::events::EventBus;
use crate::store::{
    CatalogStore, LedgerStore, OrderQuery, OrderWithItems, Page, PageRequest, Store, UserStore,
};

/// Everything a caller supplies to open an order.
#[derive(Clone, Debug)]
pub struct OrderRequest {
    pub user_id: Uuid,
    pub lines: Vec<OrderLineRequest>,
    pub contact: ContactInfo,
    pub shipping: ShippingDetails,
    pub currency: Currency,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: PaymentTransaction,
    pub items: Vec<OrderItem>,
}

/// Collapses repeated products into one line.
pub fn merge_lines(lines: &[OrderLineRequest]) -> Result<Vec<OrderLineRequest>> {
    let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity = existing.quantity.checked_add(line.quantity)?,
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    inventory: InventoryService,
    events: EventBus,
    restock_on_failure: bool,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, events: EventBus, restock_on_failure: bool) -> Self {
        Self {
            inventory: InventoryService::new(store.clone()),
            store,
            events,
            restock_on_failure,
        }
    }

    /// Prices lines from the catalog, checks stock, then places the order
    /// atomically. The user's cart is emptied as part of the same write.
    pub async fn create_order(&self, request: OrderRequest) -> Result<PlacedOrder> {
        if request.lines.is_empty() {
            return Err(EcommerceError::validation("Order must contain at least one item"));
        }
        let lines = merge_lines(&request.lines)?;
        let user = self
            .store
            .user(request.user_id)
            .await?
            .ok_or(EcommerceError::NotFound("User"))?;

        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = self.store.products_by_ids(&ids).await?;
        let snapshots = lines
            .iter()
            .map(|line| {
                products
                    .iter()
                    .find(|p| p.id == line.product_id)
                    .map(|p| LineSnapshot::of(p, line.quantity))
                    .ok_or(EcommerceError::NotFound("Product"))
            })
            .collect::<Result<Vec<_>>>()?;

        let order = NewOrder {
            transaction_id: Uuid::now_v7(),
            user_id: user.id,
            cart_id: user.cart_id,
            currency: request.currency,
            contact: request.contact,
            shipping: request.shipping,
            lines: snapshots,
        };
        order.validate()?;
        self.inventory.check_stock_availability(&lines).await?.into_result()?;

        let placed = self.store.place_order(&order).await?;
        tracing::info!(
            transaction_id = %placed.transaction.id,
            user_id = %user.id,
            amount = %placed.transaction.amount,
            items = placed.items.len(),
            "order placed"
        );
        self.events
            .publish(DomainEvent::OrderPlaced {
                transaction_id: placed.transaction.id,
                user_id: user.id,
                amount: placed.transaction.amount,
                currency: placed.transaction.currency.clone(),
                item_count: placed.items.len(),
            })
            .await;
        Ok(placed)
    }

    pub async fn attach_provider_reference(&self, transaction_id: Uuid, reference: &str) -> Result<PaymentTransaction> {
        if reference.trim().is_empty() {
            return Err(EcommerceError::validation("Reference number is required"));
        }
        let tx = self
            .store
            .attach_reference(transaction_id, reference)
            .await?
            .ok_or(EcommerceError::NotFound("Transaction"))?;
        tracing::info!(%transaction_id, reference, "provider reference attached");
        Ok(tx)
    }

    /// Applies a provider-reported status. Unknown references, replays and
    /// illegal transitions are logged outcomes, never errors.
    pub async fn apply_provider_status(&self, reference: &str, update: StatusUpdate) -> Result<ApplyOutcome> {
        let outcome = self
            .store
            .apply_status(reference, &update, self.restock_on_failure)
            .await?;
        match &outcome {
            ApplyOutcome::Applied {
                transaction,
                previous,
                stock,
            } => {
                tracing::info!(
                    transaction_id = %transaction.id,
                    reference,
                    from = %previous,
                    to = %transaction.status,
                    "payment status updated"
                );
                if !stock.shortfalls.is_empty() {
                    tracing::warn!(
                        transaction_id = %transaction.id,
                        shortfalls = ?stock.shortfalls,
                        "could not re-reserve stock for a revived payment"
                    );
                }
                self.events
                    .publish(DomainEvent::PaymentStatusChanged {
                        transaction_id: transaction.id,
                        reference_number: reference.to_string(),
                        from: *previous,
                        to: transaction.status,
                    })
                    .await;
                if !stock.restored.is_empty() {
                    self.events
                        .publish(DomainEvent::StockRestored {
                            transaction_id: transaction.id,
                            products: stock.restored.clone(),
                        })
                        .await;
                }
            }
            ApplyOutcome::Duplicate(tx) => {
                tracing::info!(transaction_id = %tx.id, reference, status = %tx.status, "duplicate payment update ignored");
            }
            ApplyOutcome::Rejected { transaction, attempted } => {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    reference,
                    current = %transaction.status,
                    attempted = %attempted,
                    "payment status transition rejected"
                );
            }
            ApplyOutcome::UnknownReference => {
                tracing::warn!(reference, "payment update for unknown reference");
            }
        }
        Ok(outcome)
    }

    pub async fn transaction(&self, id: Uuid) -> Result<PaymentTransaction> {
        self.store
            .transaction(id)
            .await?
            .ok_or(EcommerceError::NotFound("Transaction"))
    }

    pub async fn transaction_by_reference(&self, reference: &str) -> Result<Option<PaymentTransaction>> {
        self.store.transaction_by_reference(reference).await
    }

    pub async fn transactions_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<PaymentTransaction>> {
        self.store.transactions_for_user(user_id, succeeded_only).await
    }

    /// Items of a transaction the user owns; someone else's is `NotFound`.
    pub async fn transaction_items(&self, user_id: Uuid, transaction_id: Uuid) -> Result<TransactionDetail> {
        let transaction = self.transaction(transaction_id).await?;
        if transaction.user_id != user_id {
            return Err(EcommerceError::NotFound("Transaction"));
        }
        let items = self.store.order_items(transaction_id).await?;
        Ok(TransactionDetail { transaction, items })
    }

    pub async fn purchases_for_user(&self, user_id: Uuid, succeeded_only: bool) -> Result<Vec<OrderItem>> {
        self.store.order_items_for_user(user_id, succeeded_only).await
    }

    pub async fn transaction_detail(&self, id: Uuid) -> Result<TransactionDetail> {
        let transaction = self.transaction(id).await?;
        let items = self.store.order_items(id).await?;
        Ok(TransactionDetail { transaction, items })
    }

    pub async fn list_transactions(&self, page: PageRequest) -> Result<Page<PaymentTransaction>> {
        self.store.list_transactions(page).await
    }

    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Page<OrderWithItems>> {
        self.store.list_orders(query).await
    }

    pub async fn delete_transaction(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_transaction(id).await? {
            return Err(EcommerceError::NotFound("Transaction"));
        }
        tracing::info!(transaction_id = %id, "transaction deleted");
        Ok(())
    }

    pub async fn order_item(&self, id: Uuid) -> Result<OrderItem> {
        self.store
            .order_item(id)
            .await?
            .ok_or(EcommerceError::NotFound("Order item"))
    }

    pub async fn update_delivery_status(&self, item_id: Uuid, status: &str) -> Result<OrderItem> {
        let status = status.trim();
        if status.is_empty() || status.len() > 50 {
            return Err(EcommerceError::validation("Delivery status must be 1 to 50 characters"));
        }
        let item = self
            .store
            .set_delivery_status(item_id, status)
            .await?
            .ok_or(EcommerceError::NotFound("Order item"))?;
        tracing::info!(item_id = %item_id, status, "delivery status updated");
        Ok(item)
    }
}

/// Builds validated lines from raw `(product, quantity)` pairs.
pub fn order_lines(raw: impl IntoIterator<Item = (Uuid, u32)>) -> Result<Vec<OrderLineRequest>> {
    raw.into_iter()
        .map(|(product_id, quantity)| {
            Ok(OrderLineRequest {
                product_id,
                quantity: Quantity::new(quantity)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_lines() {
        let a = Uuid::new_v4();
        let lines = order_lines([(a, 1), (Uuid::new_v4(), 2), (a, 4)]).unwrap();
        let merged = merge_lines(&lines).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].quantity.value(), 5);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        assert!(order_lines([(Uuid::new_v4(), 0)]).is_err());
    }
}
