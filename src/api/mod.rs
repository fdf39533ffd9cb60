//! HTTP surface under `/api/v1`

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod extract;
pub mod form;
pub mod payment;
pub mod response;
pub mod user;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, Uri};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::domain::value_objects::Currency;
use crate::error::{EcommerceError, Result};
use crate::events::EventBus;
use crate::payment::PaymentGateway;
use crate::service::checkout::CheckoutSettings;
use crate::service::{
    AuthService, CartService, CatalogService, CheckoutService, DashboardService, Ledger,
};
use crate::storage::{ImageStore, MAX_IMAGE_BYTES};
use crate::store::Store;

pub use response::ApiResponse;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub cart: CartService,
    pub ledger: Ledger,
    pub checkout: CheckoutService,
    pub auth: AuthService,
    pub dashboard: DashboardService,
}

impl AppState {
    /// Wires every service onto one store.
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        images: Arc<dyn ImageStore>,
        events: EventBus,
    ) -> Result<Self> {
        let ledger = Ledger::new(store.clone(), events, config.restock_on_payment_failure);
        let checkout = CheckoutService::new(
            ledger.clone(),
            store.clone(),
            gateway.clone(),
            CheckoutSettings {
                success_url: config.checkout_success_url.clone(),
                cancel_url: config.checkout_cancel_url.clone(),
                default_currency: Currency::new(&config.default_currency)?,
            },
        );
        Ok(Self {
            catalog: CatalogService::new(store.clone(), images, config.app_url.clone()),
            cart: CartService::new(store.clone(), config.app_url.clone()),
            checkout,
            ledger,
            auth: AuthService::new(
                store.clone(),
                Some(gateway),
                config.jwt_secret.clone(),
                config.jwt_refresh_secret.clone(),
            ),
            dashboard: DashboardService::new(store),
        })
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "storefront"}))
}

async fn not_found(method: Method, uri: Uri) -> EcommerceError {
    tracing::debug!(%method, %uri, "no route matched");
    EcommerceError::NotFound("Route")
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me).patch(auth::update_profile))
        .route("/auth/change-password", post(auth::change_password))
        .route(
            "/products",
            get(catalog::list_products).post(catalog::create_product),
        )
        .route(
            "/products/:id",
            get(catalog::get_product)
                .put(catalog::update_product)
                .delete(catalog::delete_product),
        )
        .route(
            "/product-category",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route(
            "/product-category/:id",
            get(catalog::get_category)
                .put(catalog::update_category)
                .delete(catalog::delete_category),
        )
        .route(
            "/cart/:cart_id",
            get(cart::view)
                .post(cart::add)
                .put(cart::update)
                .delete(cart::clear),
        )
        .route("/cart/:cart_id/:product_id", axum::routing::delete(cart::remove))
        .route("/payment/stripe/create-payment", post(payment::create_payment))
        .route("/payment/stripe/transactions", get(payment::transactions))
        .route(
            "/payment/stripe/transactions/successful",
            get(payment::successful_transactions),
        )
        .route("/payment/stripe/purchases", get(payment::purchases))
        .route(
            "/payment/stripe/purchases/successful",
            get(payment::successful_purchases),
        )
        .route(
            "/payment/stripe/transaction/:transaction_id/items",
            get(payment::transaction_items),
        )
        .route("/payment/stripe/webhook", post(payment::webhook))
        .route("/user/dashboard", get(user::summary))
        .route("/user/dashboard/all-orders", get(user::orders))
        .route(
            "/user/dashboard/all-order-transactions",
            get(user::transactions),
        )
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/payment-transaction", get(admin::list_transactions))
        .route(
            "/admin/payment-transaction/:id",
            get(admin::get_transaction).delete(admin::delete_transaction),
        )
        .route("/admin/order-items", get(admin::list_orders))
        .route("/admin/order-items/:id", get(admin::get_order_item))
        .route(
            "/admin/order-items/:id/delivery-status",
            patch(admin::update_delivery_status),
        )
}

/// Builds the full application router.
pub fn router(state: AppState, storage_dir: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .nest_service("/public/storage", ServeDir::new(storage_dir))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
