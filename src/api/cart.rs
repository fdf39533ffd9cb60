//! `/cart/:cart_id` handlers

use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::extract::{AuthUser, ValidJson, ValidPath};
use super::{ApiResponse, AppState};
use crate::domain::aggregates::{CartLine, CartView};
use crate::error::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct CartLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub removed: u64,
}

pub async fn view(
    State(state): State<AppState>,
    user: AuthUser,
    ValidPath(cart_id): ValidPath<Uuid>,
) -> Result<ApiResponse<CartView>> {
    let cart = state.cart.view(user.id, cart_id).await?;
    Ok(ApiResponse::success("Cart fetched successfully", cart))
}

pub async fn add(
    State(state): State<AppState>,
    user: AuthUser,
    ValidPath(cart_id): ValidPath<Uuid>,
    ValidJson(req): ValidJson<CartLineRequest>,
) -> Result<ApiResponse<CartLine>> {
    let line = state
        .cart
        .add(user.id, cart_id, req.product_id, req.quantity)
        .await?;
    Ok(ApiResponse::created("Product added to cart", line))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    ValidPath(cart_id): ValidPath<Uuid>,
    ValidJson(req): ValidJson<CartLineRequest>,
) -> Result<ApiResponse<CartLine>> {
    let line = state
        .cart
        .update(user.id, cart_id, req.product_id, req.quantity)
        .await?;
    Ok(ApiResponse::success("Cart updated", line))
}

pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    ValidPath((cart_id, product_id)): ValidPath<(Uuid, Uuid)>,
) -> Result<ApiResponse<CartLine>> {
    let line = state.cart.remove(user.id, cart_id, product_id).await?;
    Ok(ApiResponse::success("Product removed from cart", line))
}

pub async fn clear(
    State(state): State<AppState>,
    user: AuthUser,
    ValidPath(cart_id): ValidPath<Uuid>,
) -> Result<ApiResponse<Cleared>> {
    let removed = state.cart.clear(user.id, cart_id).await?;
    Ok(ApiResponse::success("Cart cleared", Cleared { removed }))
}
