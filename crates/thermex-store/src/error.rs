//! Error types for thermex-store.

use std::path::PathBuf;

/// Result type for thermex-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in thermex-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Failed to create the storage directory.
    #[error("Failed to create storage directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Key contains characters that cannot be used in a file name.
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Stored blob was written by an incompatible version.
    #[error("Unsupported storage version {found} for key {key} (expected {expected})")]
    UnsupportedVersion {
        key: String,
        found: u32,
        expected: u32,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
