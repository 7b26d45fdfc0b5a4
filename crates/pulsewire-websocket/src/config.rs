//! WebSocket transport configuration.

use pulsewire_transport_traits::{TransportError, TransportResult};

/// Tuning for the WebSocket transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketTransportConfig {
    /// Largest frame accepted from the peer, in bytes.
    pub max_message_size: usize,

    /// Capacity of each of the link's frame channels.
    pub channel_capacity: usize,
}

impl Default for WebSocketTransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024,
            channel_capacity: 256,
        }
    }
}

impl WebSocketTransportConfig {
    /// Set the maximum inbound frame size.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the capacity of the link channels.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Rejects values the transport cannot run with.
    pub fn validate(&self) -> TransportResult<()> {
        if self.channel_capacity == 0 {
            return Err(TransportError::ConfigurationError(
                "channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(TransportError::ConfigurationError(
                "max_message_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
