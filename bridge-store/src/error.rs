//! Error types for the configuration store.

/// Errors from configuration store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database failed
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded
    #[error("record encoding error: {0}")]
    Encoding(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Convenience type alias for Results using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;
