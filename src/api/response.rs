//! Uniform JSON envelope for every response

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub exec_status: bool,
    pub http_status: u16,
    pub msg: String,
    pub custom_code: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(msg: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::OK, msg, data)
    }

    pub fn created(msg: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, msg, data)
    }

    fn with_status(status: StatusCode, msg: impl Into<String>, data: T) -> Self {
        Self {
            exec_status: true,
            http_status: status.as_u16(),
            msg: msg.into(),
            custom_code: "SUCCESS".to_string(),
            data: Some(data),
        }
    }

    pub fn failure(status: StatusCode, msg: String, code: &str, data: Option<T>) -> Self {
        Self {
            exec_status: false,
            http_status: status.as_u16(),
            msg,
            custom_code: code.to_string(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}
