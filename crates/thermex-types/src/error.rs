//! Error types for frame parsing in thermex-types.

use thiserror::Error;

/// Errors that can occur when parsing frames received from a Thermex hood.
///
/// These are protocol-level errors only. Transport and session failures
/// belong in thermex-core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The frame was not valid JSON or did not match the frame layout.
    #[error("Invalid JSON frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The frame carried neither a `Response` nor a `Notify` key.
    #[error("Unknown frame: {0}")]
    UnknownFrame(String),

    /// A field was present but held an unusable value.
    #[error("Invalid field '{field}': {message}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

impl ParseError {
    /// Create an invalid field error.
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Result type alias using thermex-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
