use core::result::Result as CoreResult;
use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for docket operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur while indexing or retrieving documents.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding provider failed to produce a vector.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The embedding provider rejected the call because of rate limiting.
    #[error("Provider rate limited: {0}")]
    RateLimited(String),

    /// An embedding or search call exceeded its time budget.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A vector did not have the dimension fixed for the index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed for the index.
        expected: usize,
        /// Dimension of the rejected vector.
        actual: usize,
    },

    /// Persisted index artifacts are missing, unreadable or inconsistent.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Encoding index state for persistence failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The index manager is in its terminal failed state.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Returns `true` for transient provider failures, rate limiting and timeouts.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::RateLimited(_) | Self::Timeout(_)
        )
    }
}
