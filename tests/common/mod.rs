#![allow(dead_code)]

pub mod flaky;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use storefront::api::AppState;
use storefront::domain::aggregates::{
    ContactInfo, NewProduct, NewUser, Product, Role, ShippingDetails, ShippingMethod, User,
};
use storefront::error::{EcommerceError, Result};
use storefront::events::EventBus;
use storefront::payment::signature::{self, DEFAULT_TOLERANCE_SECS};
use storefront::payment::{CheckoutSession, CheckoutSessionRequest, PaymentGateway, WebhookEvent};
use storefront::storage::LocalImageStore;
use storefront::store::{CatalogStore, MemoryStore, Store, UserStore};
use storefront::Config;

use self::flaky::FlakyStore;

pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Records session requests and hands out `cs_test_<n>` ids.
#[derive(Default)]
pub struct FakeGateway {
    pub sessions: Mutex<Vec<CheckoutSessionRequest>>,
    pub fail: AtomicBool,
    counter: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EcommerceError::PaymentGateway("provider returned 503".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.sessions.lock().unwrap().push(request.clone());
        Ok(CheckoutSession {
            id: format!("cs_test_{n}"),
            url: format!("https://checkout.test/pay/cs_test_{n}"),
        })
    }

    async fn create_customer(&self, _email: &str, _name: &str, user_id: Uuid) -> Result<String> {
        Ok(format!("cus_{}", user_id.simple()))
    }

    fn parse_webhook(&self, payload: &[u8], signature_header: &str) -> Result<WebhookEvent> {
        signature::verify(
            payload,
            signature_header,
            WEBHOOK_SECRET,
            Utc::now().timestamp(),
            DEFAULT_TOLERANCE_SECS,
        )?;
        WebhookEvent::from_payload(payload)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub state: AppState,
    pub config: Config,
}

pub fn harness() -> Harness {
    harness_with(Config::default())
}

pub fn harness_with(config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    build(config, store.clone(), store)
}

/// Services run on a store whose next `apply_status_failures` status
/// writes fail; `Harness::store` still reaches the data directly.
pub fn flaky_harness(apply_status_failures: usize) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(store.clone(), apply_status_failures));
    build(Config::default(), store, flaky)
}

fn build(config: Config, store: Arc<MemoryStore>, backing: Arc<dyn Store>) -> Harness {
    let gateway = Arc::new(FakeGateway::default());
    let images_root = std::env::temp_dir().join(format!("storefront-test-{}", Uuid::new_v4()));
    let state = AppState::new(
        &config,
        backing,
        gateway.clone(),
        Arc::new(LocalImageStore::new(images_root)),
        EventBus::default(),
    )
    .unwrap();
    Harness {
        store,
        gateway,
        state,
        config,
    }
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

impl Harness {
    pub async fn product(&self, name: &str, price: &str, quantity: i32) -> Product {
        self.store
            .insert_product(NewProduct {
                name: name.into(),
                price: dec(price),
                quantity,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn user(&self, email: &str) -> User {
        self.store
            .insert_user(NewUser {
                email: email.into(),
                password_hash: "unused".into(),
                first_name: "Test".into(),
                last_name: "User".into(),
                role: Role::User,
            })
            .await
            .unwrap()
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        self.store.product(product_id).await.unwrap().unwrap().quantity
    }
}

pub fn contact() -> ContactInfo {
    ContactInfo {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@example.com".into(),
        phone: "555-0100".into(),
    }
}

pub fn shipping(cost: &str) -> ShippingDetails {
    ShippingDetails {
        address: "1 Analytical Way".into(),
        city: "London".into(),
        state: "LDN".into(),
        zip_code: "N1".into(),
        method: ShippingMethod::Standard,
        cost: dec(cost),
        days: Some("3-5".into()),
    }
}

/// A signed webhook delivery for `object`.
pub fn signed_event(event_type: &str, object: serde_json::Value) -> (Vec<u8>, String) {
    let payload = serde_json::to_vec(&serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": object },
    }))
    .unwrap();
    let header = signature::sign(&payload, WEBHOOK_SECRET, Utc::now().timestamp()).unwrap();
    (payload, header)
}
