//! Types shared between the manager handle and its actor.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

use crate::envelope::Envelope;
use crate::error::{ClientError, ClientResult};

/// Lifecycle state of the one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and no attempt scheduled
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Handshake completed; frames flow
    Connected,
    /// Waiting for the backoff timer before the next attempt
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// What happened to a message handed to `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the transport
    Sent,
    /// Held in the outbound queue until the next connection
    Queued,
}

/// Messages processed by the actor, one at a time.
///
/// Timer and handshake tasks post the variants carrying an `epoch`; the
/// actor discards any whose epoch is no longer current.
#[derive(Debug)]
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<ClientResult<ConnectionState>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        envelope: Envelope,
        reply: oneshot::Sender<ClientResult<SendOutcome>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    ReconnectDue {
        epoch: u64,
    },
    HealthTick {
        epoch: u64,
    },
    HandshakeDone {
        epoch: u64,
        result: Result<pulsewire_transport_traits::TransportLink, ClientError>,
    },
}
