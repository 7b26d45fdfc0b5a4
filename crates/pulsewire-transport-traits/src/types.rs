//! Core transport types.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::TimeoutConfig;
use crate::error::TransportResult;
use crate::message::TransportMessage;

/// Enumerates the transports pulsewire knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// WebSocket for full-duplex communication.
    WebSocket,
    /// An in-process transport (tests, loopback).
    Memory,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => write!(f, "websocket"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Everything a transport needs to open one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Endpoint URL supplied at construction.
    pub url: String,

    /// Bearer token from the credential provider, attached at handshake time.
    pub bearer_token: Option<String>,

    /// Require an encrypted connection.
    pub tls: bool,

    /// Handshake and write timeouts.
    pub timeouts: TimeoutConfig,
}

impl ConnectRequest {
    /// Creates a request for `url` with default timeouts and no credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: None,
            tls: false,
            timeouts: TimeoutConfig::default(),
        }
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Require TLS.
    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Set timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

// Tokens must not end up in log lines.
impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("url", &self.url)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "<redacted>"),
            )
            .field("tls", &self.tls)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// The frame channels of one live connection.
///
/// Dropping `outbound` asks the transport to close the socket. `inbound`
/// yields `None` once the peer has closed, or `Some(Err(_))` on a transport
/// failure, after which the link is dead.
#[derive(Debug)]
pub struct TransportLink {
    /// Frames to write to the peer.
    pub outbound: mpsc::Sender<TransportMessage>,

    /// Frames read from the peer.
    pub inbound: mpsc::Receiver<TransportResult<TransportMessage>>,
}

impl TransportLink {
    /// Creates a connected pair: the link handed to the client and the
    /// opposite ends for whoever plays the peer.
    pub fn pair(
        capacity: usize,
    ) -> (
        Self,
        mpsc::Receiver<TransportMessage>,
        mpsc::Sender<TransportResult<TransportMessage>>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        (
            Self {
                outbound: outbound_tx,
                inbound: inbound_rx,
            },
            outbound_rx,
            inbound_tx,
        )
    }
}
