//! Request-surface error type
//!
//! Maps pool errors onto the JSON error bodies of the public API:
//! `{"success": false, "error": "<message>"}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors returned to API callers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Out of Stock")]
    OutOfStock,

    #[error("Database Error")]
    Database,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::OutOfStock => StatusCode::NOT_FOUND,
            ApiError::Database => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<account_pool::Error> for ApiError {
    fn from(err: account_pool::Error) -> Self {
        match err {
            account_pool::Error::OutOfStock => ApiError::OutOfStock,
            account_pool::Error::StoreUnavailable(_) => ApiError::Database,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
