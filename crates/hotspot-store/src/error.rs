//! Error types for the store layer.

/// Errors that can occur talking to the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored entry was not a byte payload.
    #[error("Unexpected value under {key}: {kind}")]
    UnexpectedValue {
        /// The key that was read.
        key: String,
        /// The value type that was found.
        kind: String,
    },
}
