//! Ledger and stock behaviour against a live PostgreSQL.
//!
//! Each test returns early when `DATABASE_URL` is unset. Rows are keyed by
//! fresh ids so runs can share one database.

mod common;

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use uuid::Uuid;

use common::{contact, dec, shipping};
use storefront::domain::aggregates::{
    ApplyOutcome, NewProduct, NewUser, PaymentStatus, PlacedOrder, Product, Role, StatusUpdate,
    User,
};
use storefront::domain::value_objects::Currency;
use storefront::error::EcommerceError;
use storefront::events::EventBus;
use storefront::service::ledger::{order_lines, Ledger, OrderRequest};
use storefront::store::{CatalogStore, LedgerStore, PgStore, UserStore};

struct Db {
    store: Arc<PgStore>,
}

async fn db() -> Option<Db> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    Some(Db {
        store: Arc::new(PgStore::new(pool)),
    })
}

impl Db {
    fn ledger(&self, restock_on_failure: bool) -> Ledger {
        Ledger::new(self.store.clone(), EventBus::default(), restock_on_failure)
    }

    async fn product(&self, quantity: i32) -> Product {
        self.store
            .insert_product(NewProduct {
                name: format!("Item {}", Uuid::new_v4().simple()),
                price: dec("4.00"),
                quantity,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn user(&self) -> User {
        self.store
            .insert_user(NewUser {
                email: format!("{}@pg.example.com", Uuid::new_v4().simple()),
                password_hash: "unused".into(),
                first_name: "Pg".into(),
                last_name: "User".into(),
                role: Role::User,
            })
            .await
            .unwrap()
    }

    async fn stock_of(&self, product_id: Uuid) -> i32 {
        self.store.product(product_id).await.unwrap().unwrap().quantity
    }
}

fn request(user: &User, lines: &[(Uuid, u32)]) -> OrderRequest {
    OrderRequest {
        user_id: user.id,
        lines: order_lines(lines.iter().copied()).unwrap(),
        contact: contact(),
        shipping: shipping("0"),
        currency: Currency::new("usd").unwrap(),
    }
}

/// Places an order and gives it a unique provider reference.
async fn referenced_order(ledger: &Ledger, user: &User, lines: &[(Uuid, u32)]) -> (PlacedOrder, String) {
    let placed = ledger.create_order(request(user, lines)).await.unwrap();
    let reference = format!("cs_pg_{}", Uuid::new_v4().simple());
    ledger
        .attach_provider_reference(placed.transaction.id, &reference)
        .await
        .unwrap();
    (placed, reference)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_oversell() {
    let Some(db) = db().await else { return };
    let product = db.product(5).await;
    let ledger = db.ledger(false);

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let ledger = ledger.clone();
        let user = db.user().await;
        tasks.push(tokio::spawn(async move {
            ledger.create_order(request(&user, &[(product.id, 1)])).await
        }));
    }
    let mut placed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => placed += 1,
            Err(EcommerceError::InsufficientStock(lines)) => {
                assert_eq!(lines[0].product_id, product.id);
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(placed, 5);
    assert_eq!(db.stock_of(product.id).await, 0);
}

#[tokio::test]
async fn test_short_line_rolls_back_the_whole_order() {
    let Some(db) = db().await else { return };
    let plenty = db.product(5).await;
    let scarce = db.product(1).await;
    let user = db.user().await;

    let err = db
        .ledger(false)
        .create_order(request(&user, &[(plenty.id, 2), (scarce.id, 2)]))
        .await
        .unwrap_err();
    match err {
        EcommerceError::InsufficientStock(lines) => {
            assert_eq!(lines.len(), 1);
            assert_eq!(lines[0].product_id, scarce.id);
            assert_eq!(lines[0].available, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(db.stock_of(plenty.id).await, 5);
    assert_eq!(db.stock_of(scarce.id).await, 1);
    assert!(db
        .store
        .transactions_for_user(user.id, false)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_replayed_status_is_a_no_op_and_succeeded_is_terminal() {
    let Some(db) = db().await else { return };
    let product = db.product(5).await;
    let user = db.user().await;
    let ledger = db.ledger(true);
    let (placed, reference) = referenced_order(&ledger, &user, &[(product.id, 2)]).await;

    let mut paid = StatusUpdate::new(PaymentStatus::Succeeded);
    paid.paid_amount = Some(dec("8.00"));
    paid.paid_currency = Some("usd".into());
    let first = ledger.apply_provider_status(&reference, paid.clone()).await.unwrap();
    assert!(matches!(first, ApplyOutcome::Applied { previous: PaymentStatus::Pending, .. }));
    let settled = ledger.transaction(placed.transaction.id).await.unwrap();

    let replay = ledger.apply_provider_status(&reference, paid).await.unwrap();
    assert!(matches!(replay, ApplyOutcome::Duplicate(_)));
    let after_replay = ledger.transaction(placed.transaction.id).await.unwrap();
    assert_eq!(after_replay.updated_at, settled.updated_at);

    let failed = ledger
        .apply_provider_status(&reference, StatusUpdate::new(PaymentStatus::Failed))
        .await
        .unwrap();
    assert!(matches!(
        failed,
        ApplyOutcome::Rejected { attempted: PaymentStatus::Failed, .. }
    ));
    let tx = ledger.transaction(placed.transaction.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Succeeded);
    assert_eq!(tx.paid_amount, Some(dec("8.00")));
    assert_eq!(db.stock_of(product.id).await, 3);
}

#[tokio::test]
async fn test_failure_restocks_once() {
    let Some(db) = db().await else { return };
    let product = db.product(5).await;
    let user = db.user().await;
    let ledger = db.ledger(true);
    let (placed, reference) = referenced_order(&ledger, &user, &[(product.id, 3)]).await;
    assert_eq!(db.stock_of(product.id).await, 2);

    let outcome = ledger
        .apply_provider_status(&reference, StatusUpdate::new(PaymentStatus::Canceled))
        .await
        .unwrap();
    match outcome {
        ApplyOutcome::Applied { stock, .. } => assert_eq!(stock.restored, vec![(product.id, 3)]),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(db.stock_of(product.id).await, 5);

    let replay = ledger
        .apply_provider_status(&reference, StatusUpdate::new(PaymentStatus::Canceled))
        .await
        .unwrap();
    assert!(matches!(replay, ApplyOutcome::Duplicate(_)));
    assert_eq!(db.stock_of(product.id).await, 5);
    let tx = ledger.transaction(placed.transaction.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Canceled);
}

#[tokio::test]
async fn test_unknown_reference_touches_nothing() {
    let Some(db) = db().await else { return };
    let outcome = db
        .store
        .apply_status(
            &format!("cs_pg_missing_{}", Uuid::new_v4().simple()),
            &StatusUpdate::new(PaymentStatus::Succeeded),
            true,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ApplyOutcome::UnknownReference));
}
