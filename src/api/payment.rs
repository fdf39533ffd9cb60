//! `/payment/stripe` handlers: checkout, the caller's ledger reads, webhook

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::extract::{AuthUser, ValidJson, ValidPath};
use super::{ApiResponse, AppState};
use crate::domain::aggregates::{
    ContactInfo, OrderItem, PaymentTransaction, ShippingDetails, ShippingMethod,
};
use crate::error::{EcommerceError, Result};
use crate::service::checkout::{CheckoutRequest, CheckoutResult};
use crate::service::ledger::{order_lines, TransactionDetail};

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize, Serialize)]
pub struct ItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Checkout body. Without `items` the caller's cart is checked out.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(length(min = 1, max = 100))]
    pub items: Option<Vec<ItemRequest>>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub contact_first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub contact_last_name: String,
    #[validate(email)]
    pub contact_email: String,
    #[validate(length(min = 1, max = 40))]
    pub contact_phone: String,
    #[validate(length(min = 1, max = 255))]
    pub shipping_address: String,
    #[validate(length(min = 1, max = 100))]
    pub shipping_city: String,
    #[validate(length(min = 1, max = 100))]
    pub shipping_state: String,
    #[validate(length(min = 1, max = 20))]
    pub shipping_zip_code: String,
    #[serde(default)]
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub shipping_cost: Decimal,
    pub shipping_days: Option<String>,
}

impl CreatePaymentRequest {
    fn into_checkout(self) -> Result<CheckoutRequest> {
        let lines = match self.items {
            Some(items) => Some(order_lines(items.into_iter().map(|i| (i.product_id, i.quantity)))?),
            None => None,
        };
        Ok(CheckoutRequest {
            lines,
            contact: ContactInfo {
                first_name: self.contact_first_name,
                last_name: self.contact_last_name,
                email: self.contact_email,
                phone: self.contact_phone,
            },
            shipping: ShippingDetails {
                address: self.shipping_address,
                city: self.shipping_city,
                state: self.shipping_state,
                zip_code: self.shipping_zip_code,
                method: self.shipping_method,
                cost: self.shipping_cost,
                days: self.shipping_days.filter(|d| !d.trim().is_empty()),
            },
            currency: self.currency,
        })
    }
}

pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(req): ValidJson<CreatePaymentRequest>,
) -> Result<ApiResponse<CheckoutResult>> {
    let result = state.checkout.checkout(user.id, req.into_checkout()?).await?;
    Ok(ApiResponse::created("Payment session created successfully", result))
}

pub async fn transactions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<PaymentTransaction>>> {
    let rows = state.ledger.transactions_for_user(user.id, false).await?;
    Ok(ApiResponse::success("User transactions fetched successfully", rows))
}

pub async fn successful_transactions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<PaymentTransaction>>> {
    let rows = state.ledger.transactions_for_user(user.id, true).await?;
    Ok(ApiResponse::success("User successful transactions fetched successfully", rows))
}

pub async fn purchases(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<OrderItem>>> {
    let rows = state.ledger.purchases_for_user(user.id, false).await?;
    Ok(ApiResponse::success("User purchases fetched successfully", rows))
}

pub async fn successful_purchases(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<OrderItem>>> {
    let rows = state.ledger.purchases_for_user(user.id, true).await?;
    Ok(ApiResponse::success("User successful purchases fetched successfully", rows))
}

pub async fn transaction_items(
    State(state): State<AppState>,
    user: AuthUser,
    ValidPath(transaction_id): ValidPath<Uuid>,
) -> Result<ApiResponse<TransactionDetail>> {
    let detail = state.ledger.transaction_items(user.id, transaction_id).await?;
    Ok(ApiResponse::success("Transaction items fetched successfully", detail))
}

/// Takes the raw body: the signature covers the exact bytes sent.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<()>> {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("webhook without signature header");
        return Err(EcommerceError::SignatureInvalid("missing signature header".into()));
    };
    state.checkout.handle_webhook(&body, signature).await?;
    Ok(ApiResponse::success("Webhook received", ()))
}
