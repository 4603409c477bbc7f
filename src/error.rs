//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache, lock and counter operations.
///
/// "Limit reached" and "lock held" are expected outcomes and are returned as
/// values, never as variants of this enum.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key (or backing-store row) not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding or decoding a cached payload failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connectivity or protocol failure talking to Redis
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Command rejected by the store (wrong type, unknown script, ...)
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Store did not answer in time
    #[error("Store did not respond within {0:?}")]
    Timeout(Duration),
}

impl CacheError {
    /// Returns true for the expected "absent" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// Returns true when the store could not be reached or answered garbage.
    pub fn is_unavailable(&self) -> bool {
        match self {
            CacheError::Redis(err) => {
                err.is_io_error()
                    || err.is_connection_dropped()
                    || err.is_connection_refusal()
                    || err.is_timeout()
            }
            CacheError::Timeout(_) => true,
            _ => false,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
