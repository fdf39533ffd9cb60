//! `/user/dashboard` handlers

use axum::extract::State;

use super::extract::AuthUser;
use super::{ApiResponse, AppState};
use crate::domain::aggregates::{OrderItem, PaymentTransaction};
use crate::error::Result;
use crate::store::UserSummary;

pub async fn summary(State(state): State<AppState>, user: AuthUser) -> Result<ApiResponse<UserSummary>> {
    let summary = state.dashboard.user_summary(user.id).await?;
    Ok(ApiResponse::success("Dashboard fetched successfully", summary))
}

pub async fn orders(State(state): State<AppState>, user: AuthUser) -> Result<ApiResponse<Vec<OrderItem>>> {
    let rows = state.ledger.purchases_for_user(user.id, false).await?;
    Ok(ApiResponse::success("Orders fetched successfully", rows))
}

pub async fn transactions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<PaymentTransaction>>> {
    let rows = state.ledger.transactions_for_user(user.id, false).await?;
    Ok(ApiResponse::success("Transactions fetched successfully", rows))
}
