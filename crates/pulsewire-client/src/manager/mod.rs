//! Connection manager: the caller-facing handle
//!
//! [`ConnectionManager`] is a cheap, cloneable handle. All state lives in a
//! single actor task (see `actor.rs`); every method on the handle posts a
//! command and awaits the reply, so operations from any number of tasks are
//! applied in one total order.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pulsewire_client::{ClientConfig, ConnectionManager, EventKind, NoCredentials};
//! use pulsewire_websocket::WebSocketTransport;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::client("wss://stream.example.com/v1");
//! let manager = ConnectionManager::new(
//!     config,
//!     Arc::new(WebSocketTransport::default()),
//!     Arc::new(NoCredentials),
//! )?;
//!
//! manager.on(EventKind::message("price"), |event| println!("{event:?}"));
//! manager.connect().await?;
//! manager.send("subscribe", serde_json::json!({"symbol": "ACME"})).await?;
//! # Ok(())
//! # }
//! ```

mod actor;
mod types;

pub use types::{ConnectionState, SendOutcome};

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use pulsewire_transport_traits::{CredentialProvider, Transport};

use crate::circuit_breaker::CircuitState;
use crate::config::ClientConfig;
use crate::dispatcher::{ClientEvent, EventDispatcher, EventKind, HandlerId};
use crate::envelope::Envelope;
use crate::error::{ClientError, ClientResult};
use crate::metrics::ConnectionMetrics;

use actor::Actor;
use types::Command;

/// Depth of the command channel between handles and the actor
const COMMAND_BUFFER: usize = 64;

/// Handle to one logical, self-healing connection.
///
/// Clones share the same connection. The actor stops after [`shutdown`]
/// or once every handle has been dropped.
///
/// [`shutdown`]: ConnectionManager::shutdown
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    metrics: Arc<RwLock<ConnectionMetrics>>,
    dispatcher: EventDispatcher,
    endpoint: Arc<str>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("state", &*self.state.borrow())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Validate `config` and spawn the actor on the current tokio runtime.
    ///
    /// No connection is attempted until [`connect`](Self::connect) or
    /// [`send`](Self::send) is called.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the configuration is invalid
    /// or no tokio runtime is running.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ClientError::Configuration(format!("connection manager needs a tokio runtime: {e}"))
        })?;

        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let metrics = Arc::new(RwLock::new(ConnectionMetrics::new(
            config.max_latency_samples,
            config.max_recent_errors,
        )));
        let dispatcher = EventDispatcher::new();
        let endpoint: Arc<str> = Arc::from(config.url.as_str());

        debug!(
            %endpoint,
            transport = %transport.transport_type(),
            "Spawning connection manager"
        );
        let actor = Actor::new(
            config,
            transport,
            credentials,
            rx,
            commands.downgrade(),
            state_tx,
            metrics.clone(),
            dispatcher.clone(),
        );
        runtime.spawn(actor.run());

        Ok(Self {
            commands,
            state,
            metrics,
            dispatcher,
            endpoint,
        })
    }

    /// Establish the connection, or join an attempt already in flight.
    ///
    /// Resolves with the state reached once the attempt settles:
    /// `Connected` on success, `Reconnecting` if a retry was scheduled, or
    /// `Disconnected` if retries are disabled or a disconnect intervened.
    ///
    /// # Errors
    ///
    /// - [`ClientError::CircuitOpen`] while the breaker refuses attempts
    /// - [`ClientError::ReconnectExhausted`] when this attempt spends the
    ///   last of an automatic retry budget
    /// - [`ClientError::Configuration`] for failures no retry can fix
    /// - [`ClientError::Closed`] after shutdown
    pub async fn connect(&self) -> ClientResult<ConnectionState> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    /// Tear the connection down and cancel any scheduled reconnection.
    ///
    /// Queued messages are kept and flushed on the next connection.
    /// Calling this while already disconnected is a no-op.
    pub async fn disconnect(&self) -> ClientResult<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Wrap `payload` in an envelope of type `kind` and send it.
    ///
    /// While not connected the envelope is queued, and from `Disconnected`
    /// a connection attempt is started.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] if the payload cannot be encoded,
    /// [`ClientError::CircuitOpen`] if the message was queued but no attempt
    /// could start, or [`ClientError::Closed`] after shutdown.
    pub async fn send<P>(&self, kind: impl Into<String>, payload: P) -> ClientResult<SendOutcome>
    where
        P: Serialize,
    {
        let payload = serde_json::to_value(payload)
            .map_err(|e| ClientError::Protocol(format!("payload is not encodable: {e}")))?;
        self.send_envelope(Envelope::new(kind, payload)).await
    }

    /// Send a pre-built envelope, keeping its `id` and `timestamp`.
    pub async fn send_envelope(&self, envelope: Envelope) -> ClientResult<SendOutcome> {
        self.request(|reply| Command::Send { envelope, reply }).await?
    }

    /// Register a listener. See [`EventDispatcher`] for delivery rules.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> HandlerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.dispatcher.on(kind, listener)
    }

    /// Remove a listener registered with [`on`](Self::on)
    pub fn off(&self, kind: &EventKind, id: HandlerId) -> bool {
        self.dispatcher.off(kind, id)
    }

    /// The shared event dispatcher
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// `true` while the state is `Connected`
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Last state published by the actor
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every published state change
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Point-in-time copy of the connection metrics
    pub fn metrics(&self) -> ConnectionMetrics {
        self.metrics.read().clone()
    }

    /// Breaker state as of the last processed command
    pub fn circuit_state(&self) -> CircuitState {
        self.metrics.read().circuit_state
    }

    /// Configured endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Disconnect and stop the actor. Later calls on any clone return
    /// [`ClientError::Closed`]; calling `shutdown` again is harmless.
    pub async fn shutdown(&self) -> ClientResult<()> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) | Err(ClientError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> ClientResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ClientError::Closed)?;
        response.await.map_err(|_| ClientError::Closed)
    }
}
