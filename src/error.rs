//! Error types for the caching proxy
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
/// Unified error type for the caching proxy.
///
/// Only `OriginUnavailable` and `InvalidRequest` are expected to reach a
/// client. Cache-layer variants are recovered locally and degrade to a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not present in the store
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key present but past its expiry
    #[error("Key expired: {0}")]
    Expired(String),

    /// Internal structures of the cache are in an unexpected state
    #[error("Internal cache fault: {0}")]
    InternalFault(String),

    /// Forwarding to the origin failed at the network layer
    #[error("Origin unavailable: {0}")]
    OriginUnavailable(String),

    /// Inbound request could not be forwarded as received
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// True for the two variants the router treats as a plain cache miss.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::NotFound(_) | CacheError::Expired(_))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) | CacheError::Expired(_) | CacheError::InternalFault(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CacheError::OriginUnavailable(_) => StatusCode::BAD_GATEWAY,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching proxy.
pub type Result<T> = std::result::Result<T, CacheError>;
