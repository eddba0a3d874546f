//! Error types for thermex-core.
//!
//! This module defines the errors that can occur while talking to a Thermex
//! hood over its WebSocket API, and while persisting integration state.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::RequestTimeout`] | Already retried once by the hub | Device missed a request |
//! | [`Error::ConnectionFailed`] | Reconnect with delay | Device may be rebooting |
//! | [`Error::ConnectionLost`] | Reconnect | Socket dropped mid-session |
//! | [`Error::ReconnectInProgress`] | Retry later | Another task is reconnecting |
//! | [`Error::ReconnectExhausted`] | Wait for the watchdog | Device unreachable for now |
//! | [`Error::Authentication`] | Do not retry | Fix the API key |
//! | [`Error::RequestFailed`] | Do not retry | Device rejected the request |
//! | [`Error::Closing`] | Do not retry | Hub is shutting down |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//!
//! Malformed frames produce [`Error::Protocol`] internally; the receive loop
//! logs and drops them, so callers waiting on unrelated requests never see
//! them.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when communicating with a Thermex hood.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Opening the WebSocket failed.
    #[error("Connection to {host} failed: {reason}")]
    ConnectionFailed {
        /// Host (or URL) that could not be reached.
        host: String,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// An established socket failed while sending or receiving.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The device rejected the API key or sent a malformed handshake reply.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No matching response arrived in time.
    #[error("Request '{kind}' timed out after {duration:?}")]
    RequestTimeout {
        /// The request kind.
        kind: String,
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// The device answered with a non-success status.
    #[error("Request '{kind}' failed with status {}", display_status(.status))]
    RequestFailed {
        /// The request kind.
        kind: String,
        /// Status code from the response, if any.
        status: Option<i64>,
    },

    /// A frame could not be parsed.
    #[error("Protocol error: {0}")]
    Protocol(#[from] thermex_types::ParseError),

    /// Another task is already reconnecting.
    #[error("Reconnection already in progress")]
    ReconnectInProgress,

    /// All reconnection attempts failed.
    #[error("Reconnection failed after {attempts} attempts: {last_error}")]
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Message of the last failure.
        last_error: String,
    },

    /// The hub is closing or closed.
    #[error("Hub is closing")]
    Closing,

    /// Operation attempted without a socket.
    #[error("Not connected to device")]
    NotConnected,

    /// Persisting or loading state failed.
    #[error("Storage error: {0}")]
    Store(#[from] thermex_store::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// The device refused the TCP connection.
    Refused,
    /// Connection attempt timed out.
    Timeout,
    /// The socket closed before the handshake completed.
    ClosedDuringHandshake,
    /// WebSocket or TLS level error.
    Transport(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refused => write!(f, "connection refused"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::ClosedDuringHandshake => write!(f, "socket closed during handshake"),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a request timeout error.
    pub fn timeout(kind: impl Into<String>, duration: Duration) -> Self {
        Self::RequestTimeout {
            kind: kind.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(host: impl Into<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            reason,
        }
    }

    /// Create a connection failure with a string reason.
    ///
    /// This is a convenience method that wraps the string in `ConnectionFailureReason::Other`.
    pub fn connection_failed_str(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            reason: ConnectionFailureReason::Other(reason.into()),
        }
    }

    /// Whether the operation may succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RequestTimeout { .. }
                | Error::ConnectionLost(_)
                | Error::NotConnected
                | Error::ReconnectInProgress
                | Error::ReconnectExhausted { .. }
        ) || matches!(
            self,
            Error::ConnectionFailed { reason, .. }
                if !matches!(reason, ConnectionFailureReason::Other(_))
        )
    }

    /// Whether this error is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::RequestTimeout { .. })
    }
}

fn display_status(status: &Option<i64>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// Result type alias using thermex-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
