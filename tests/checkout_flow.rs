mod common;

use serde_json::json;
use std::sync::atomic::Ordering;

use common::{contact, dec, flaky_harness, harness, harness_with, shipping, signed_event};
use storefront::domain::aggregates::{ApplyOutcome, PaymentStatus, ProductPatch};
use storefront::domain::value_objects::Patch;
use storefront::error::EcommerceError;
use storefront::service::checkout::CheckoutRequest;
use storefront::service::ledger::order_lines;
use storefront::store::{CartStore, CatalogStore, LedgerStore};
use storefront::Config;

fn cart_checkout(cost: &str) -> CheckoutRequest {
    CheckoutRequest {
        lines: None,
        contact: contact(),
        shipping: shipping(cost),
        currency: None,
    }
}

#[tokio::test]
async fn test_checkout_from_cart_places_pending_order() {
    let h = harness();
    let product = h.product("Tonkotsu", "10.00", 5).await;
    let user = h.user("buyer@example.com").await;
    h.state.cart.add(user.id, user.cart_id, product.id, 3).await.unwrap();

    let result = h.state.checkout.checkout(user.id, cart_checkout("2.00")).await.unwrap();

    assert_eq!(result.transaction.amount, dec("32.00"));
    assert_eq!(result.transaction.status, PaymentStatus::Pending);
    assert_eq!(result.transaction.reference_number.as_deref(), Some("cs_test_1"));
    assert_eq!(result.session_id, "cs_test_1");
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].quantity, 3);
    assert_eq!(result.items[0].total_price, dec("30.00"));
    assert_eq!(h.stock_of(product.id).await, 2);
    assert!(h.store.cart_lines(user.cart_id).await.unwrap().is_empty());

    let sessions = h.gateway.sessions.lock().unwrap();
    let request = &sessions[0];
    assert_eq!(request.transaction_id, result.transaction.id);
    assert_eq!(request.lines.len(), 2);
    assert_eq!(request.lines[0].unit_amount, 1000);
    assert_eq!(request.lines[1].unit_amount, 200);
    assert!(request
        .metadata
        .iter()
        .any(|(k, v)| k == "transaction_id" && *v == result.transaction.id.to_string()));
}

#[tokio::test]
async fn test_checkout_with_empty_cart_is_rejected() {
    let h = harness();
    let user = h.user("empty@example.com").await;
    let err = h.state.checkout.checkout(user.id, cart_checkout("0")).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));
    assert!(h.gateway.sessions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_failure_leaves_pending_without_reference() {
    let h = harness();
    let product = h.product("Gyoza", "6.00", 4).await;
    let user = h.user("fail@example.com").await;
    h.gateway.fail.store(true, Ordering::SeqCst);

    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 2)]).unwrap()),
        ..cart_checkout("0")
    };
    let err = h.state.checkout.checkout(user.id, request).await.unwrap_err();
    assert_eq!(err.custom_code(), "PAYMENT_GATEWAY_ERROR");

    let transactions = h.store.transactions_for_user(user.id, false).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].status, PaymentStatus::Pending);
    assert!(transactions[0].reference_number.is_none());
}

#[tokio::test]
async fn test_session_completed_marks_succeeded() {
    let h = harness();
    let product = h.product("Ramen", "10.00", 5).await;
    let user = h.user("paid@example.com").await;
    h.state.cart.add(user.id, user.cart_id, product.id, 3).await.unwrap();
    let order = h.state.checkout.checkout(user.id, cart_checkout("2.00")).await.unwrap();

    let (payload, header) = signed_event(
        "checkout.session.completed",
        json!({"id": order.session_id, "amount_total": 3200, "currency": "usd", "payment_status": "paid"}),
    );
    h.state.checkout.handle_webhook(&payload, &header).await.unwrap();

    let tx = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Succeeded);
    assert_eq!(tx.paid_amount, Some(dec("32.00")));
    assert_eq!(tx.paid_currency.as_deref(), Some("usd"));
    assert_eq!(tx.raw_status.as_deref(), Some("paid"));
}

#[tokio::test]
async fn test_webhook_replay_is_idempotent_and_never_regresses() {
    let h = harness();
    let product = h.product("Udon", "8.00", 5).await;
    let user = h.user("replay@example.com").await;
    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 1)]).unwrap()),
        ..cart_checkout("0")
    };
    let order = h.state.checkout.checkout(user.id, request).await.unwrap();
    let completed = json!({"id": order.session_id, "amount_total": 800, "currency": "usd", "payment_status": "paid"});

    let (payload, header) = signed_event("checkout.session.completed", completed.clone());
    h.state.checkout.handle_webhook(&payload, &header).await.unwrap();
    let first = h.state.ledger.transaction(order.transaction.id).await.unwrap();

    let (payload, header) = signed_event("checkout.session.completed", completed);
    h.state.checkout.handle_webhook(&payload, &header).await.unwrap();
    let second = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(second.status, PaymentStatus::Succeeded);
    assert_eq!(second.paid_amount, first.paid_amount);
    assert_eq!(second.updated_at, first.updated_at);

    let (payload, header) = signed_event(
        "payment_intent.payment_failed",
        json!({"id": "pi_123", "status": "requires_payment_method",
               "metadata": {"transaction_id": order.transaction.id.to_string()}}),
    );
    h.state.checkout.handle_webhook(&payload, &header).await.unwrap();
    let after = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(after.status, PaymentStatus::Succeeded);
    assert_eq!(after.paid_amount, Some(dec("8.00")));
}

#[tokio::test]
async fn test_payment_intent_resolved_through_metadata() {
    let h = harness();
    let product = h.product("Mochi", "4.00", 5).await;
    let user = h.user("intent@example.com").await;
    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 2)]).unwrap()),
        ..cart_checkout("0")
    };
    let order = h.state.checkout.checkout(user.id, request).await.unwrap();

    let (payload, _) = signed_event(
        "payment_intent.succeeded",
        json!({"id": "pi_777", "amount_received": 800, "currency": "usd", "status": "succeeded",
               "metadata": {"transaction_id": order.transaction.id.to_string()}}),
    );
    let event = storefront::payment::WebhookEvent::from_payload(&payload).unwrap();
    let outcome = h.state.checkout.dispatch(&event).await.unwrap();
    assert!(matches!(outcome, Some(ApplyOutcome::Applied { .. })));

    let tx = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Succeeded);
    assert_eq!(tx.paid_amount, Some(dec("8.00")));
}

#[tokio::test]
async fn test_bad_signature_is_rejected_before_parsing() {
    let h = harness();
    let (payload, _) = signed_event("checkout.session.completed", json!({"id": "cs_x"}));
    let err = h
        .state
        .checkout
        .handle_webhook(&payload, "t=1,v1=deadbeef")
        .await
        .unwrap_err();
    assert!(matches!(err, EcommerceError::SignatureInvalid(_)));

    let (_, header) = signed_event("checkout.session.completed", json!({"id": "cs_x"}));
    let err = h
        .state
        .checkout
        .handle_webhook(b"{\"tampered\":true}", &header)
        .await
        .unwrap_err();
    assert!(matches!(err, EcommerceError::SignatureInvalid(_)));
}

#[tokio::test]
async fn test_unknown_reference_and_unhandled_kinds_are_acknowledged() {
    let h = harness();
    let (payload, header) = signed_event(
        "checkout.session.completed",
        json!({"id": "cs_missing", "amount_total": 100, "currency": "usd", "payment_status": "paid"}),
    );
    assert!(h.state.checkout.handle_webhook(&payload, &header).await.is_ok());

    let (payload, header) = signed_event("customer.created", json!({"id": "cus_1"}));
    assert!(h.state.checkout.handle_webhook(&payload, &header).await.is_ok());
    let event = storefront::payment::WebhookEvent::from_payload(&payload).unwrap();
    assert!(h.state.checkout.dispatch(&event).await.unwrap().is_none());
}

#[tokio::test]
async fn test_restock_on_failure_when_enabled() {
    let h = harness_with(Config {
        restock_on_payment_failure: true,
        ..Config::default()
    });
    let product = h.product("Karaage", "9.00", 5).await;
    let user = h.user("restock@example.com").await;
    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 3)]).unwrap()),
        ..cart_checkout("0")
    };
    let order = h.state.checkout.checkout(user.id, request).await.unwrap();
    assert_eq!(h.stock_of(product.id).await, 2);

    let (payload, header) = signed_event(
        "payment_intent.canceled",
        json!({"id": "pi_cancel", "status": "canceled",
               "metadata": {"transaction_id": order.transaction.id.to_string()}}),
    );
    h.state.checkout.handle_webhook(&payload, &header).await.unwrap();
    let tx = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Canceled);
    assert_eq!(h.stock_of(product.id).await, 5);
}

#[tokio::test]
async fn test_failure_keeps_stock_by_default() {
    let h = harness();
    let product = h.product("Edamame", "3.00", 5).await;
    let user = h.user("keep@example.com").await;
    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 2)]).unwrap()),
        ..cart_checkout("0")
    };
    let order = h.state.checkout.checkout(user.id, request).await.unwrap();

    let (payload, header) = signed_event(
        "payment_intent.payment_failed",
        json!({"id": "pi_f", "status": "requires_payment_method",
               "metadata": {"transaction_id": order.transaction.id.to_string()}}),
    );
    h.state.checkout.handle_webhook(&payload, &header).await.unwrap();
    let tx = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Failed);
    assert_eq!(h.stock_of(product.id).await, 3);
}

#[tokio::test]
async fn test_dashboards_count_only_settled_revenue() {
    let h = harness();
    let product = h.product("Bento", "15.00", 10).await;
    let user = h.user("dash@example.com").await;

    let mut orders = Vec::new();
    for quantity in [2, 1] {
        let request = CheckoutRequest {
            lines: Some(order_lines([(product.id, quantity)]).unwrap()),
            ..cart_checkout("0")
        };
        orders.push(h.state.checkout.checkout(user.id, request).await.unwrap());
    }
    let (payload, header) = signed_event(
        "checkout.session.completed",
        json!({"id": orders[0].session_id, "amount_total": 3000, "currency": "usd", "payment_status": "paid"}),
    );
    h.state.checkout.handle_webhook(&payload, &header).await.unwrap();

    let counts = h.state.dashboard.admin_counts().await.unwrap();
    assert_eq!(counts.total_products, 1);
    assert_eq!(counts.total_users, 1);
    assert_eq!(counts.total_transactions, 2);
    assert_eq!(counts.total_orders, 2);
    assert_eq!(counts.total_revenue, dec("30.00"));

    let summary = h.state.dashboard.user_summary(user.id).await.unwrap();
    assert_eq!(summary.total_transactions, 2);
    assert_eq!(summary.succeeded_transactions, 1);
    assert_eq!(summary.total_spent, dec("30.00"));
    assert_eq!(summary.items_purchased, 2);
}

#[tokio::test]
async fn test_checkout_rejects_currency_other_than_configured() {
    let h = harness();
    let product = h.product("Natto", "5.00", 5).await;
    let user = h.user("yen@example.com").await;
    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 1)]).unwrap()),
        currency: Some("jpy".into()),
        ..cart_checkout("0")
    };
    let err = h.state.checkout.checkout(user.id, request).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));
    assert_eq!(h.stock_of(product.id).await, 5);
    assert!(h.gateway.sessions.lock().unwrap().is_empty());

    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 1)]).unwrap()),
        currency: Some("USD".into()),
        ..cart_checkout("0")
    };
    let order = h.state.checkout.checkout(user.id, request).await.unwrap();
    assert_eq!(order.transaction.currency, "usd");
}

#[tokio::test]
async fn test_zero_decimal_store_charges_whole_units() {
    let h = harness_with(Config {
        default_currency: "jpy".into(),
        ..Config::default()
    });
    let product = h.product("Onigiri", "1000", 5).await;
    let user = h.user("tokyo@example.com").await;
    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 2)]).unwrap()),
        ..cart_checkout("0")
    };
    let order = h.state.checkout.checkout(user.id, request).await.unwrap();
    {
        let sessions = h.gateway.sessions.lock().unwrap();
        assert_eq!(sessions[0].currency.as_str(), "jpy");
        assert_eq!(sessions[0].lines[0].unit_amount, 1000);
    }

    let (payload, header) = signed_event(
        "checkout.session.completed",
        json!({"id": order.session_id, "amount_total": 2000, "currency": "jpy", "payment_status": "paid"}),
    );
    h.state.checkout.handle_webhook(&payload, &header).await.unwrap();
    let tx = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(tx.paid_amount, Some(dec("2000")));
}

#[tokio::test]
async fn test_storage_failure_during_webhook_is_returned_for_redelivery() {
    let h = flaky_harness(1);
    let product = h.product("Taiyaki", "5.00", 5).await;
    let user = h.user("retry@example.com").await;
    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 2)]).unwrap()),
        ..cart_checkout("0")
    };
    let order = h.state.checkout.checkout(user.id, request).await.unwrap();
    let completed = json!({"id": order.session_id, "amount_total": 1000, "currency": "usd", "payment_status": "paid"});

    let (payload, header) = signed_event("checkout.session.completed", completed.clone());
    let err = h.state.checkout.handle_webhook(&payload, &header).await.unwrap_err();
    assert_eq!(err.status().as_u16(), 500);
    let tx = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Pending);

    h.state.checkout.handle_webhook(&payload, &header).await.unwrap();
    let tx = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Succeeded);
    assert_eq!(tx.paid_amount, Some(dec("10.00")));
}

#[tokio::test]
async fn test_malformed_session_object_is_acknowledged() {
    let h = harness();
    let (payload, header) = signed_event(
        "checkout.session.completed",
        json!({"amount_total": 100, "currency": "usd", "payment_status": "paid"}),
    );
    assert!(h.state.checkout.handle_webhook(&payload, &header).await.is_ok());
}

#[tokio::test]
async fn test_restock_overflow_changes_nothing() {
    let h = harness_with(Config {
        restock_on_payment_failure: true,
        ..Config::default()
    });
    let product = h.product("Senbei", "2.00", 5).await;
    let user = h.user("overflow@example.com").await;
    let request = CheckoutRequest {
        lines: Some(order_lines([(product.id, 3)]).unwrap()),
        ..cart_checkout("0")
    };
    let order = h.state.checkout.checkout(user.id, request).await.unwrap();
    h.store
        .update_product(
            product.id,
            ProductPatch {
                quantity: Patch::Present(i32::MAX),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (payload, _) = signed_event(
        "payment_intent.canceled",
        json!({"id": "pi_overflow", "status": "canceled",
               "metadata": {"transaction_id": order.transaction.id.to_string()}}),
    );
    let event = storefront::payment::WebhookEvent::from_payload(&payload).unwrap();
    let err = h.state.checkout.dispatch(&event).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));

    let tx = h.state.ledger.transaction(order.transaction.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Pending);
    assert_eq!(h.stock_of(product.id).await, i32::MAX);
}
