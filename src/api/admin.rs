//! Admin-only ledger management and counts

use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::extract::{AdminUser, ValidJson, ValidPath, ValidQuery};
use super::{ApiResponse, AppState};
use crate::domain::aggregates::{OrderItem, PaymentTransaction};
use crate::error::Result;
use crate::service::ledger::TransactionDetail;
use crate::store::{DashboardCounts, OrderQuery, OrderWithItems, Page, PageRequest};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeliveryStatusRequest {
    #[validate(length(min = 1, max = 50))]
    pub delivery_status: String,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: Uuid,
}

pub async fn dashboard(State(state): State<AppState>, _admin: AdminUser) -> Result<ApiResponse<DashboardCounts>> {
    let counts = state.dashboard.admin_counts().await?;
    Ok(ApiResponse::success("Dashboard fetched successfully", counts))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidQuery(params): ValidQuery<ListParams>,
) -> Result<ApiResponse<Page<PaymentTransaction>>> {
    let page = state
        .ledger
        .list_transactions(PageRequest::new(params.page, params.limit))
        .await?;
    Ok(ApiResponse::success("Transactions fetched successfully", page))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<ApiResponse<TransactionDetail>> {
    let detail = state.ledger.transaction_detail(id).await?;
    Ok(ApiResponse::success("Transaction fetched successfully", detail))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<ApiResponse<Deleted>> {
    state.ledger.delete_transaction(id).await?;
    tracing::info!(admin_id = %admin.id, transaction_id = %id, "admin deleted transaction");
    Ok(ApiResponse::success("Transaction deleted successfully", Deleted { id }))
}

pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidQuery(params): ValidQuery<ListParams>,
) -> Result<ApiResponse<Page<OrderWithItems>>> {
    let query = OrderQuery {
        search: params.q.filter(|s| !s.trim().is_empty()),
        page: PageRequest::new(params.page, params.limit),
    };
    let page = state.ledger.list_orders(&query).await?;
    Ok(ApiResponse::success("Orders fetched successfully", page))
}

pub async fn get_order_item(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<ApiResponse<OrderItem>> {
    let item = state.ledger.order_item(id).await?;
    Ok(ApiResponse::success("Order item fetched successfully", item))
}

pub async fn update_delivery_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(req): ValidJson<DeliveryStatusRequest>,
) -> Result<ApiResponse<OrderItem>> {
    let item = state.ledger.update_delivery_status(id, &req.delivery_status).await?;
    Ok(ApiResponse::success("Delivery status updated successfully", item))
}
