use core::result::Result as CoreResult;
use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur in the core library.
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

    /// Binary encoding or decoding of a persisted blob failed.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller supplied input that can never succeed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested blob or record does not exist.
    #[error("Not found: {key}")]
    NotFound {
        /// Key or identifier that was looked up
        key: String,
    },

    /// A bounded operation ran out of time.
    #[error("{operation} timed out after {seconds} seconds")]
    Timeout {
        /// Human-readable name of the operation
        operation: String,
        /// Budget that was exceeded
        seconds: u64,
    },

    /// The storage backend rejected an operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The embedding model call failed or returned garbage.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Returns `true` for transient errors like timeouts or backend failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Storage(_) | Self::Embedding(_)
        )
    }

    /// Whether this error means the looked-up object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
