mod common;

use common::{contact, harness, shipping};
use storefront::domain::value_objects::Currency;
use storefront::error::EcommerceError;
use storefront::service::inventory::InventoryService;
use storefront::service::ledger::{order_lines, OrderRequest};
use storefront::store::{CartStore, CatalogStore, LedgerStore};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reductions_never_oversell() {
    let h = harness();
    let product = h.product("Limited Bowl", "12.00", 10).await;
    let inventory = InventoryService::new(h.store.clone());

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let inventory = inventory.clone();
        tasks.push(tokio::spawn(async move { inventory.reduce_quantity(product.id, 1).await }));
    }
    let mut sold = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => sold += 1,
            Err(EcommerceError::InsufficientStock(_)) => refused += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(sold, 10);
    assert_eq!(refused, 10);
    assert_eq!(h.stock_of(product.id).await, 0);
}

#[tokio::test]
async fn test_reduce_multiple_touches_nothing_on_shortage() {
    let h = harness();
    let plenty = h.product("Plenty", "1.00", 50).await;
    let scarce = h.product("Scarce", "1.00", 1).await;
    let inventory = InventoryService::new(h.store.clone());

    let lines = order_lines([(plenty.id, 5), (scarce.id, 2)]).unwrap();
    let check = inventory.check_stock_availability(&lines).await.unwrap();
    assert!(!check.available);
    assert_eq!(check.insufficient.len(), 1);
    assert_eq!(check.insufficient[0].product_id, scarce.id);
    assert_eq!(check.insufficient[0].available, 1);

    let err = inventory.reduce_multiple_quantities(&lines).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InsufficientStock(ref s) if s.len() == 1));
    assert_eq!(h.stock_of(plenty.id).await, 50);
    assert_eq!(h.stock_of(scarce.id).await, 1);
}

#[tokio::test]
async fn test_repeated_lines_are_checked_together() {
    let h = harness();
    let product = h.product("Split", "1.00", 3).await;
    let inventory = InventoryService::new(h.store.clone());

    let lines = order_lines([(product.id, 2), (product.id, 2)]).unwrap();
    assert!(!inventory.check_stock_availability(&lines).await.unwrap().available);
    assert!(inventory.reduce_multiple_quantities(&lines).await.is_err());
    assert_eq!(h.stock_of(product.id).await, 3);
}

#[tokio::test]
async fn test_unknown_products_are_reported_missing() {
    let h = harness();
    let inventory = InventoryService::new(h.store.clone());
    let ghost = uuid::Uuid::new_v4();

    let check = inventory
        .check_stock_availability(&order_lines([(ghost, 1)]).unwrap())
        .await
        .unwrap();
    assert_eq!(check.missing, vec![ghost]);
    assert!(matches!(check.into_result(), Err(EcommerceError::NotFound(_))));
}

#[tokio::test]
async fn test_reduce_and_restore_leave_other_fields_alone() {
    let h = harness();
    let product = h.product("Steady", "7.50", 4).await;
    let inventory = InventoryService::new(h.store.clone());

    let reduced = inventory.reduce_quantity(product.id, 3).await.unwrap();
    assert_eq!(reduced.quantity, 1);
    assert_eq!(reduced.name, product.name);
    assert_eq!(reduced.price, product.price);
    assert_eq!(reduced.category_id, product.category_id);

    let restored = inventory.restore_quantity(product.id, 3).await.unwrap();
    assert_eq!(restored.quantity, 4);
    assert!(inventory.reduce_quantity(product.id, 0).await.is_err());
}

#[tokio::test]
async fn test_create_order_is_all_or_nothing() {
    let h = harness();
    let first = h.product("First", "5.00", 10).await;
    let second = h.product("Second", "5.00", 1).await;
    let user = h.user("atomic@example.com").await;
    h.state.cart.add(user.id, user.cart_id, first.id, 2).await.unwrap();

    let err = h
        .state
        .ledger
        .create_order(OrderRequest {
            user_id: user.id,
            lines: order_lines([(first.id, 2), (second.id, 5)]).unwrap(),
            contact: contact(),
            shipping: shipping("0"),
            currency: Currency::new("usd").unwrap(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EcommerceError::InsufficientStock(_)));

    assert_eq!(h.stock_of(first.id).await, 10);
    assert_eq!(h.stock_of(second.id).await, 1);
    assert!(h.store.transactions_for_user(user.id, false).await.unwrap().is_empty());
    assert_eq!(h.store.cart_lines(user.cart_id).await.unwrap().len(), 1);
    assert!(h.store.product(first.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_order_snapshots_survive_catalog_changes() {
    let h = harness();
    let product = h.product("Seasonal", "9.99", 3).await;
    let user = h.user("snapshot@example.com").await;
    let placed = h
        .state
        .ledger
        .create_order(OrderRequest {
            user_id: user.id,
            lines: order_lines([(product.id, 1)]).unwrap(),
            contact: contact(),
            shipping: shipping("0"),
            currency: Currency::new("usd").unwrap(),
        })
        .await
        .unwrap();

    h.state.catalog.delete_product(product.id).await.unwrap();
    let items = h.store.order_items(placed.transaction.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_name, "Seasonal");
    assert_eq!(items[0].product_id, None);
}
