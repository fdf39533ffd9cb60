//! Error taxonomy and its mapping onto the HTTP envelope

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::api::response::ApiResponse;

/// One line of a failed stock check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StockShortage {
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub available: i32,
    pub requested: u32,
}

impl std::fmt::Display for StockShortage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.product_name {
            Some(name) => write!(
                f,
                "{name}: available {}, requested {}",
                self.available, self.requested
            ),
            None => write!(f, "product {} not found", self.product_id),
        }
    }
}

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("Insufficient stock: {}", join_shortages(.0))]
    InsufficientStock(Vec<StockShortage>),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Payment provider error: {0}")]
    PaymentGateway(String),

    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_shortages(items: &[StockShortage]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

impl EcommerceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(code: &'static str, msg: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PaymentGateway(_) => StatusCode::BAD_GATEWAY,
            Self::SignatureInvalid(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable code clients branch on.
    pub fn custom_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict { code, .. } => code,
            Self::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::PaymentGateway(_) => "PAYMENT_GATEWAY_ERROR",
            Self::SignatureInvalid(_) => "SIGNATURE_INVALID",
            Self::Storage(_) | Self::Database(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show a client. Infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(_) | Self::Database(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::PaymentGateway(_) => "Payment provider is unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.custom_code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.custom_code(), "request rejected");
        }
        let data = match &self {
            Self::InsufficientStock(shortages) => serde_json::to_value(shortages).ok(),
            _ => None,
        };
        ApiResponse::<serde_json::Value>::failure(status, self.public_message(), self.custom_code(), data)
            .into_response()
    }
}
