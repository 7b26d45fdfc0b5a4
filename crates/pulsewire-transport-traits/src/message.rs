//! Transport message types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Whether a frame carries UTF-8 text or raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MessageKind {
    /// A UTF-8 text frame.
    #[default]
    Text,
    /// A binary frame.
    Binary,
}

/// A single frame being sent or received over a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// The frame payload.
    pub payload: Bytes,

    /// Text or binary.
    pub kind: MessageKind,
}

impl TransportMessage {
    /// Creates a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: Bytes::from(text.into()),
            kind: MessageKind::Text,
        }
    }

    /// Creates a binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            kind: MessageKind::Binary,
        }
    }

    /// Returns the size of the payload in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Returns the payload as UTF-8, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
