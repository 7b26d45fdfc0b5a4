//! Transport error types.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish a connection (refused, DNS failure, reset during upgrade).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to send a frame.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The handshake did not complete within the configured timeout.
    #[error(
        "Handshake timed out after {timeout:?}. \
         If this is expected, increase the timeout with \
         `TimeoutConfig {{ handshake: Duration::from_secs({}) }}`",
        timeout.as_secs().max(1) * 2
    )]
    HandshakeTimeout {
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// The remote endpoint rejected the supplied credentials.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The endpoint URL could not be used.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The link was already closed.
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Returns `true` if retrying the same operation later may succeed.
    ///
    /// URL and configuration errors will fail the same way on every attempt.
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidUrl(_) | Self::ConfigurationError(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::ConnectionFailed(err.to_string())
    }
}
