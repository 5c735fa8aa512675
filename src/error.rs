//! Error types for the caching layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the caching layer.
///
/// `Config` is returned at construction time and `InvalidRequest` by the
/// demo handlers. Backend failures are absorbed by the engine, which logs
/// them and treats the operation as a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid or missing configuration (bad TTL, missing backend options)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Store backend unreachable or command failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Cache item could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Response body could not be read while capturing it
    #[error("Body error: {0}")]
    Body(String),

    /// Request body exceeded the engine's body limit while being buffered
    #[error("Request body error: {0}")]
    RequestBody(String),

    /// Request rejected by a demo handler
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::Body(_) => StatusCode::BAD_GATEWAY,
            CacheError::RequestBody(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching layer.
pub type Result<T> = std::result::Result<T, CacheError>;
