//! Products and categories. Reads are public, writes need an admin.

use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use super::extract::{AdminUser, ValidPath, ValidQuery};
use super::form::Form;
use super::{ApiResponse, AppState};
use crate::error::Result;
use crate::service::catalog::{CategoryView, ProductView};
use crate::store::{Page, PageRequest, ProductQuery};

#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    pub q: Option<String>,
    pub category_id: Option<Uuid>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<ProductListParams> for ProductQuery {
    fn from(p: ProductListParams) -> Self {
        ProductQuery {
            search: p.q.filter(|s| !s.trim().is_empty()),
            category_id: p.category_id,
            page: PageRequest::new(p.page, p.limit),
        }
    }
}

pub async fn list_products(
    State(state): State<AppState>,
    ValidQuery(params): ValidQuery<ProductListParams>,
) -> Result<ApiResponse<Page<ProductView>>> {
    let page = state.catalog.list_products(&params.into()).await?;
    Ok(ApiResponse::success("Products fetched successfully", page))
}

pub async fn get_product(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<ApiResponse<ProductView>> {
    let product = state.catalog.product(id).await?;
    Ok(ApiResponse::success("Product fetched successfully", product))
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    form: Form,
) -> Result<ApiResponse<ProductView>> {
    let new = form.new_product()?;
    let product = state.catalog.create_product(new, form.image).await?;
    tracing::debug!(admin_id = %admin.id, product_id = %product.product.id, "admin created product");
    Ok(ApiResponse::created("Product created successfully", product))
}

pub async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidPath(id): ValidPath<Uuid>,
    form: Form,
) -> Result<ApiResponse<ProductView>> {
    let patch = form.product_patch()?;
    let product = state.catalog.update_product(id, patch, form.image).await?;
    Ok(ApiResponse::success("Product updated successfully", product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<ApiResponse<ProductView>> {
    let product = state.catalog.delete_product(id).await?;
    Ok(ApiResponse::success("Product deleted successfully", product))
}

pub async fn list_categories(State(state): State<AppState>) -> Result<ApiResponse<Vec<CategoryView>>> {
    let rows = state.catalog.list_categories().await?;
    Ok(ApiResponse::success("Categories fetched successfully", rows))
}

pub async fn get_category(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<ApiResponse<CategoryView>> {
    let category = state.catalog.category(id).await?;
    Ok(ApiResponse::success("Category fetched successfully", category))
}

pub async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    form: Form,
) -> Result<ApiResponse<CategoryView>> {
    let new = form.new_category()?;
    let category = state.catalog.create_category(new, form.image).await?;
    Ok(ApiResponse::created("Category created successfully", category))
}

pub async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidPath(id): ValidPath<Uuid>,
    form: Form,
) -> Result<ApiResponse<CategoryView>> {
    let patch = form.category_patch()?;
    let category = state.catalog.update_category(id, patch, form.image).await?;
    Ok(ApiResponse::success("Category updated successfully", category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<ApiResponse<CategoryView>> {
    let category = state.catalog.delete_category(id).await?;
    Ok(ApiResponse::success("Category deleted successfully", category))
}
