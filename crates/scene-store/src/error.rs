//! Error types for store operations

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object or point does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The store could not be reached or rejected the operation
    #[error("transport error: {0}")]
    Transport(String),

    /// A subscription pattern could not be compiled
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Stored data could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
