//! Error types for the dual cache
//!
//! Provides unified error handling using thiserror.

use std::io;
use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Builder state could not be turned into a cache
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A value could not be converted to its textual form
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Stored data could not be converted back into a value
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// File create/read/write/delete failure in the disk layer
    #[error("Disk I/O error on {}: {source}", path.display())]
    DiskIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A single entry is larger than the layer's whole capacity
    #[error("Entry of {size} bytes exceeds capacity of {capacity} bytes")]
    CapacityRejected { size: u64, capacity: u64 },

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Wraps an I/O failure together with the path it happened on.
    pub fn disk_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::DiskIo {
            path: path.into(),
            source,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Configuration(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::CapacityRejected { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::Serialization(_)
            | CacheError::Deserialization(_)
            | CacheError::DiskIo { .. }
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
