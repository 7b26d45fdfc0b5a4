//! Client error types.

use std::time::Duration;

use pulsewire_transport_traits::TransportError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the connection manager, either as a `Result` or as an
/// `error` event.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ClientError {
    /// The transport failed (refused, DNS, TLS, connection lost).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A handshake or health probe exceeded its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// What was being waited on
        operation: &'static str,
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// A malformed frame, or a message type nobody listens for.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The circuit breaker is open and refused the attempt.
    #[error("Circuit breaker is open; retry after {retry_after:?}")]
    CircuitOpen {
        /// Remaining cool-down before a trial attempt is allowed
        retry_after: Duration,
    },

    /// Automatic reconnection gave up.
    #[error("Reconnection abandoned after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of reconnection attempts made
        attempts: u32,
    },

    /// An event listener panicked.
    #[error("Listener for '{event}' panicked: {message}")]
    Listener {
        /// Event the listener was registered for
        event: String,
        /// Panic message
        message: String,
    },

    /// The client was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The connection manager has shut down.
    #[error("Connection manager is closed")]
    Closed,
}

impl ClientError {
    /// Returns `true` for failures that the client recovers from on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::Timeout { .. } | Self::Protocol(_) | Self::Listener { .. } => true,
            Self::CircuitOpen { .. } => true,
            Self::ReconnectExhausted { .. } | Self::Configuration(_) | Self::Closed => false,
        }
    }

    /// Returns `true` for failures after which automatic recovery has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ReconnectExhausted { .. } | Self::Configuration(_) | Self::Closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let refused = ClientError::from(TransportError::ConnectionFailed("refused".into()));
        assert!(refused.is_transient());
        assert!(!refused.is_terminal());

        let exhausted = ClientError::ReconnectExhausted { attempts: 5 };
        assert!(exhausted.is_terminal());
        assert!(!exhausted.is_transient());

        let open = ClientError::CircuitOpen {
            retry_after: Duration::from_secs(3),
        };
        assert!(!open.is_terminal());

        let bad_url = ClientError::from(TransportError::InvalidUrl("ftp://".into()));
        assert!(!bad_url.is_transient());
    }

    #[test]
    fn test_display() {
        let err = ClientError::Timeout {
            operation: "handshake",
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "handshake timed out after 10s");

        let err = ClientError::Listener {
            event: "alert".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Listener for 'alert' panicked: boom");
    }
}
