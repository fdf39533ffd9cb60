//! `/auth` handlers

use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use super::extract::{AuthUser, ValidJson};
use super::{ApiResponse, AppState};
use crate::domain::aggregates::{ProfileUpdate, User};
use crate::error::Result;
use crate::service::auth::{Registration, TokenPair};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

pub async fn register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<ApiResponse<TokenPair>> {
    let pair = state
        .auth
        .register(Registration {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
        })
        .await?;
    Ok(ApiResponse::created("Registered successfully", pair))
}

pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<ApiResponse<TokenPair>> {
    let pair = state.auth.login(&req.email, &req.password).await?;
    Ok(ApiResponse::success("Logged in successfully", pair))
}

pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshRequest>,
) -> Result<ApiResponse<TokenPair>> {
    let pair = state.auth.refresh(&req.refresh_token).await?;
    Ok(ApiResponse::success("Token refreshed", pair))
}

pub async fn logout(State(state): State<AppState>, user: AuthUser) -> Result<ApiResponse<()>> {
    state.auth.logout(user.id).await?;
    Ok(ApiResponse::success("Logged out", ()))
}

pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<ApiResponse<User>> {
    let me = state.auth.me(user.id).await?;
    Ok(ApiResponse::success("User fetched successfully", me))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(req): ValidJson<ProfileRequest>,
) -> Result<ApiResponse<User>> {
    let updated = state
        .auth
        .update_profile(
            user.id,
            ProfileUpdate {
                first_name: req.first_name,
                last_name: req.last_name,
            },
        )
        .await?;
    Ok(ApiResponse::success("Profile updated successfully", updated))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(req): ValidJson<ChangePasswordRequest>,
) -> Result<ApiResponse<()>> {
    state
        .auth
        .change_password(user.id, &req.current_password, &req.new_password)
        .await?;
    Ok(ApiResponse::success("Password changed, please log in again", ()))
}
