//! The serialized event loop behind [`ConnectionManager`](super::ConnectionManager)
//!
//! Every state change happens here, one [`Command`] or inbound frame at a
//! time. Timers and the handshake run as separate tasks, but they only post
//! commands back; they never touch state. Each such command carries the
//! epoch it was scheduled under, and the epoch is bumped on every attempt,
//! teardown and explicit disconnect, so a late timer or handshake result is
//! recognised and dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use pulsewire_transport_traits::{
    ConnectRequest, CredentialProvider, Transport, TransportError, TransportLink,
    TransportMessage, TransportResult,
};

use super::types::{Command, ConnectionState, SendOutcome};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::ClientConfig;
use crate::dispatcher::{ClientEvent, EventDispatcher};
use crate::envelope::Envelope;
use crate::error::{ClientError, ClientResult};
use crate::health::{HealthAction, HealthMonitor};
use crate::metrics::ConnectionMetrics;
use crate::queue::{MessageQueue, QueuedMessage};
use crate::reconnect::ReconnectionPolicy;

type ConnectReply = oneshot::Sender<ClientResult<ConnectionState>>;

pub(crate) struct Actor {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    commands: mpsc::Receiver<Command>,
    self_tx: mpsc::WeakSender<Command>,
    state_tx: watch::Sender<ConnectionState>,
    metrics: Arc<RwLock<ConnectionMetrics>>,
    dispatcher: EventDispatcher,

    state: ConnectionState,
    epoch: u64,
    link: Option<TransportLink>,
    breaker: CircuitBreaker,
    policy: ReconnectionPolicy,
    queue: MessageQueue,
    health: HealthMonitor,
    reconnect_attempts: u32,
    /// Cleared by the first inbound frame of a connection
    awaiting_confirmation: bool,
    reconnect_timer: Option<JoinHandle<()>>,
    handshake: Option<JoinHandle<()>>,
    connect_waiters: Vec<ConnectReply>,
}

impl Actor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        commands: mpsc::Receiver<Command>,
        self_tx: mpsc::WeakSender<Command>,
        state_tx: watch::Sender<ConnectionState>,
        metrics: Arc<RwLock<ConnectionMetrics>>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.circuit_breaker_config());
        let policy = config.reconnection_policy();
        let queue = MessageQueue::with_policy(
            config.queue_capacity,
            config.eviction,
            config.queue_max_age,
        );
        let health = HealthMonitor::new(config.ping_interval, config.health_grace);

        Self {
            config,
            transport,
            credentials,
            commands,
            self_tx,
            state_tx,
            metrics,
            dispatcher,
            state: ConnectionState::Disconnected,
            epoch: 0,
            link: None,
            breaker,
            policy,
            queue,
            health,
            reconnect_attempts: 0,
            awaiting_confirmation: false,
            reconnect_timer: None,
            handshake: None,
            connect_waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        info!(endpoint = %self.config.url, "Connection manager started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("All handles dropped");
                        self.disconnect("client dropped");
                        break;
                    }
                },
                frame = next_frame(&mut self.link) => self.on_frame(frame),
            }
            self.sync_metrics();
        }

        self.sync_metrics();
        info!(endpoint = %self.config.url, "Connection manager stopped");
    }

    /// Process one command. Returns `false` once the actor should exit.
    pub(crate) async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { reply } => self.on_connect(reply),
            Command::Disconnect { reply } => {
                self.disconnect("client disconnect");
                self.sync_metrics();
                let _ = reply.send(());
            }
            Command::Send { envelope, reply } => {
                let outcome = self.on_send(envelope).await;
                self.sync_metrics();
                let _ = reply.send(outcome);
            }
            Command::Shutdown { reply } => {
                self.disconnect("shutdown");
                self.sync_metrics();
                let _ = reply.send(());
                return false;
            }
            Command::ReconnectDue { epoch } => self.on_reconnect_due(epoch),
            Command::HealthTick { epoch } => self.on_health_tick(epoch).await,
            Command::HandshakeDone { epoch, result } => {
                self.on_handshake_done(epoch, result).await;
            }
        }
        true
    }

    fn on_connect(&mut self, reply: ConnectReply) {
        match self.state {
            ConnectionState::Connected => {
                self.sync_metrics();
                let _ = reply.send(Ok(ConnectionState::Connected));
            }
            ConnectionState::Connecting => self.connect_waiters.push(reply),
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                match self.try_begin_attempt() {
                    Ok(()) => self.connect_waiters.push(reply),
                    Err(err) => {
                        self.sync_metrics();
                        let _ = reply.send(Err(err));
                    }
                }
            }
        }
    }

    /// Start a caller-initiated attempt if the breaker allows it, replacing
    /// any armed timer.
    fn try_begin_attempt(&mut self) -> ClientResult<()> {
        if !self.breaker.permits() {
            let err = ClientError::CircuitOpen {
                retry_after: self.breaker.remaining_cooldown(),
            };
            warn!(endpoint = %self.config.url, error = %err, "Connection attempt refused");
            self.report_error(err.clone());
            return Err(err);
        }
        if self.state == ConnectionState::Disconnected && self.reconnect_attempts > 0 {
            // A caller-initiated session gets a fresh retry budget.
            debug!(attempts = self.reconnect_attempts, "Resetting reconnect counter");
            self.reconnect_attempts = 0;
        }
        self.cancel_reconnect_timer();
        self.begin_attempt();
        Ok(())
    }

    fn begin_attempt(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.set_state(ConnectionState::Connecting);
        info!(
            endpoint = %self.config.url,
            transport = self.transport.name().unwrap_or("unnamed"),
            epoch,
            attempt = self.reconnect_attempts,
            "Connecting"
        );

        if let Some(previous) = self.handshake.take() {
            previous.abort();
        }

        let transport = self.transport.clone();
        let credentials = self.credentials.clone();
        let request = self.config.connect_request();
        let timeout = self.config.handshake_timeout;
        let tx = self.self_tx.clone();

        self.handshake = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(
                timeout,
                handshake(transport.as_ref(), credentials.as_ref(), request),
            )
            .await
            {
                Ok(Ok(link)) => Ok(link),
                Ok(Err(e)) => Err(ClientError::Transport(e)),
                Err(_) => Err(ClientError::Timeout {
                    operation: "handshake",
                    timeout,
                }),
            };
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::HandshakeDone { epoch, result }).await;
            }
        }));
    }

    async fn on_handshake_done(
        &mut self,
        epoch: u64,
        result: Result<TransportLink, ClientError>,
    ) {
        if epoch != self.epoch || self.state != ConnectionState::Connecting {
            debug!(epoch, current = self.epoch, "Discarding stale handshake result");
            return;
        }
        self.handshake = None;

        match result {
            Ok(link) => self.on_connected(link).await,
            Err(err) => self.on_attempt_failed(err),
        }
    }

    async fn on_connected(&mut self, link: TransportLink) {
        self.link = Some(link);
        self.awaiting_confirmation = true;
        self.set_state(ConnectionState::Connected);
        info!(endpoint = %self.config.url, epoch = self.epoch, "Connected");

        self.start_health();
        self.flush_queue().await;
        if self.state == ConnectionState::Connected {
            self.dispatcher.emit(&ClientEvent::Connect {
                endpoint: self.config.url.clone(),
            });
        }

        let state = self.state;
        self.resolve_waiters(Ok(state));
    }

    fn on_attempt_failed(&mut self, err: ClientError) {
        warn!(endpoint = %self.config.url, error = %err, "Connection attempt failed");

        if let ClientError::Transport(cause) = &err
            && !cause.is_transient()
        {
            // Retrying an unusable URL or configuration fails the same way.
            // Not a backend failure: a half-open trial is handed back uncounted.
            self.breaker.abandon_trial();
            let terminal = ClientError::Configuration(cause.to_string());
            self.set_state(ConnectionState::Disconnected);
            self.report_error(terminal.clone());
            self.resolve_waiters(Err(terminal));
            return;
        }

        self.breaker.record_failure();
        self.set_state(ConnectionState::Disconnected);
        self.report_error(err);
        let outcome = self.schedule_reconnect();
        self.resolve_waiters(outcome);
    }

    /// Arm the backoff timer, or give up if the budget is spent.
    fn schedule_reconnect(&mut self) -> ClientResult<ConnectionState> {
        if self.policy.is_disabled() {
            debug!("Automatic reconnection disabled");
            self.set_state(ConnectionState::Disconnected);
            return Ok(ConnectionState::Disconnected);
        }

        if self.policy.is_exhausted(self.reconnect_attempts) {
            let err = ClientError::ReconnectExhausted {
                attempts: self.reconnect_attempts,
            };
            error!(endpoint = %self.config.url, attempts = self.reconnect_attempts, "Giving up on reconnection");
            self.set_state(ConnectionState::Disconnected);
            self.report_error(err.clone());
            return Err(err);
        }

        let delay = self.policy.next_delay(self.reconnect_attempts);
        self.reconnect_attempts += 1;
        self.set_state(ConnectionState::Reconnecting);
        info!(
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnection scheduled"
        );
        self.dispatcher.emit(&ClientEvent::Reconnecting {
            attempt: self.reconnect_attempts,
            delay,
        });
        self.arm_reconnect_timer(delay);
        Ok(ConnectionState::Reconnecting)
    }

    fn on_reconnect_due(&mut self, epoch: u64) {
        if epoch != self.epoch || self.state != ConnectionState::Reconnecting {
            debug!(epoch, current = self.epoch, "Ignoring stale reconnection timer");
            return;
        }
        self.reconnect_timer = None;

        if !self.breaker.permits() {
            let wait = self.breaker.remaining_cooldown().max(Duration::from_millis(1));
            debug!(wait_ms = wait.as_millis() as u64, "Circuit open, deferring reconnection");
            self.arm_reconnect_timer(wait);
            return;
        }
        self.begin_attempt();
    }

    fn arm_reconnect_timer(&mut self, delay: Duration) {
        self.cancel_reconnect_timer();
        let epoch = self.epoch;
        let tx = self.self_tx.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::ReconnectDue { epoch }).await;
            }
        }));
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    /// Explicit teardown. Idempotent.
    fn disconnect(&mut self, reason: &str) {
        self.epoch += 1;
        self.cancel_reconnect_timer();
        if let Some(handshake) = self.handshake.take() {
            handshake.abort();
            self.breaker.abandon_trial();
        }
        if self.awaiting_confirmation {
            self.breaker.abandon_trial();
        }
        self.health.stop();
        self.link = None;
        self.awaiting_confirmation = false;

        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
            info!(endpoint = %self.config.url, %reason, "Disconnected");
            self.dispatcher.emit(&ClientEvent::Disconnect {
                reason: reason.to_string(),
            });
        }
        self.resolve_waiters(Ok(ConnectionState::Disconnected));
    }

    /// Teardown after a failure on an established connection.
    fn connection_lost(&mut self, err: ClientError) {
        if self.state != ConnectionState::Connected {
            return;
        }
        warn!(endpoint = %self.config.url, error = %err, "Connection lost");

        self.epoch += 1;
        self.health.stop();
        self.link = None;
        self.awaiting_confirmation = false;
        self.breaker.record_failure();

        self.set_state(ConnectionState::Disconnected);
        self.dispatcher.emit(&ClientEvent::Disconnect {
            reason: err.to_string(),
        });
        self.report_error(err);
        let _ = self.schedule_reconnect();
    }

    async fn on_send(&mut self, envelope: Envelope) -> ClientResult<SendOutcome> {
        let frame = envelope.to_json()?;

        match self.state {
            ConnectionState::Connected => match self.transmit(frame).await {
                Ok(()) => Ok(SendOutcome::Sent),
                Err(err) => {
                    let mut message = QueuedMessage::new(envelope);
                    message.attempts = 1;
                    self.enqueue(message);
                    self.connection_lost(err);
                    Ok(SendOutcome::Queued)
                }
            },
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.enqueue(QueuedMessage::new(envelope));
                Ok(SendOutcome::Queued)
            }
            ConnectionState::Disconnected => {
                self.enqueue(QueuedMessage::new(envelope));
                self.try_begin_attempt()?;
                Ok(SendOutcome::Queued)
            }
        }
    }

    fn enqueue(&mut self, message: QueuedMessage) {
        let id = message.id().to_string();
        if !self.queue.enqueue(message) {
            debug!(%id, queued = self.queue.len(), "Queue at capacity");
        }
    }

    /// Write one text frame, waiting at most `send_timeout` for buffer space.
    async fn transmit(&self, frame: String) -> ClientResult<()> {
        let Some(link) = &self.link else {
            return Err(ClientError::Transport(TransportError::Closed));
        };

        let timeout = self.config.send_timeout;
        match tokio::time::timeout(timeout, link.outbound.send(TransportMessage::text(frame)))
            .await
        {
            Ok(Ok(())) => {
                self.metrics.write().messages_sent += 1;
                Ok(())
            }
            Ok(Err(_)) => Err(ClientError::Transport(TransportError::SendFailed(
                "transport writer has closed".to_string(),
            ))),
            Err(_) => Err(ClientError::Timeout {
                operation: "send",
                timeout,
            }),
        }
    }

    async fn flush_queue(&mut self) {
        let pending = self.queue.dequeue_all();
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "Flushing queued messages");

        let mut remaining = pending.into_iter();
        while let Some(mut message) = remaining.next() {
            message.attempts += 1;
            let frame = match message.envelope.to_json() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(id = %message.id(), error = %err, "Dropping unencodable message");
                    continue;
                }
            };
            if let Err(err) = self.transmit(frame).await {
                let mut unsent = vec![message];
                unsent.extend(remaining);
                self.queue.requeue_front(unsent);
                self.connection_lost(err);
                return;
            }
        }
    }

    fn on_frame(&mut self, frame: Option<TransportResult<TransportMessage>>) {
        match frame {
            Some(Ok(message)) => self.on_message(message),
            Some(Err(e)) => self.connection_lost(ClientError::Transport(e)),
            None => self.connection_lost(ClientError::Transport(TransportError::ConnectionLost(
                "peer closed the connection".to_string(),
            ))),
        }
    }

    fn on_message(&mut self, message: TransportMessage) {
        self.metrics.write().messages_received += 1;

        if self.awaiting_confirmation {
            self.awaiting_confirmation = false;
            self.breaker.record_success();
            if self.reconnect_attempts > 0 {
                debug!(attempts = self.reconnect_attempts, "Connection confirmed, resetting reconnect counter");
            }
            self.reconnect_attempts = 0;
        }

        let envelope = match Envelope::from_slice(&message.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.protocol_error(err);
                return;
            }
        };

        if envelope.is_health_check() {
            match self.health.on_echo(&envelope) {
                Some(rtt) => {
                    trace!(rtt_ms = rtt.as_millis() as u64, "Health echo");
                    self.metrics.write().latency_samples.record(rtt);
                }
                None => debug!(id = %envelope.id, "Unmatched health check ignored"),
            }
            return;
        }

        trace!(kind = %envelope.kind, id = %envelope.id, "Dispatching message");
        let kind = envelope.kind.clone();
        if self.dispatcher.emit(&ClientEvent::Message(envelope)) == 0 {
            self.protocol_error(ClientError::Protocol(format!(
                "no listener for message type '{kind}'"
            )));
        }
    }

    fn protocol_error(&mut self, err: ClientError) {
        warn!(error = %err, "Dropping inbound frame");
        self.metrics.write().messages_dropped_protocol += 1;
        self.report_error(err);
    }

    async fn on_health_tick(&mut self, epoch: u64) {
        if epoch != self.epoch || self.state != ConnectionState::Connected {
            return;
        }

        match self.health.on_tick() {
            HealthAction::Expired { waited } => {
                self.metrics.write().health_check_failures += 1;
                warn!(waited_ms = waited.as_millis() as u64, "Health probe unanswered");
                let grace = self.health.grace();
                self.connection_lost(ClientError::Timeout {
                    operation: "health check",
                    timeout: grace,
                });
            }
            HealthAction::Probe(probe) => {
                self.metrics.write().health_checks_sent += 1;
                let sent = match probe.to_json() {
                    Ok(frame) => self.transmit(frame).await,
                    Err(err) => Err(err),
                };
                if let Err(err) = sent {
                    self.connection_lost(err);
                }
            }
        }
    }

    fn start_health(&mut self) {
        let epoch = self.epoch;
        let tx = self.self_tx.clone();
        self.health.start(move || {
            let tx = tx.clone();
            async move {
                match tx.upgrade() {
                    Some(tx) => tx.send(Command::HealthTick { epoch }).await.is_ok(),
                    None => false,
                }
            }
        });
    }

    fn report_error(&mut self, err: ClientError) {
        self.metrics.write().record_error(err.to_string());
        self.dispatcher.emit(&ClientEvent::Error(err));
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, epoch = self.epoch, "State transition");
        self.state = next;
        {
            let mut metrics = self.metrics.write();
            metrics.connection_state = next;
            metrics.connected_at = (next == ConnectionState::Connected).then(chrono::Utc::now);
        }
        self.state_tx.send_replace(next);
    }

    fn resolve_waiters(&mut self, result: ClientResult<ConnectionState>) {
        if self.connect_waiters.is_empty() {
            return;
        }
        self.sync_metrics();
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    fn sync_metrics(&self) {
        let mut metrics = self.metrics.write();
        metrics.connection_state = self.state;
        metrics.circuit_state = self.breaker.state();
        metrics.reconnect_attempts = self.reconnect_attempts;
        metrics.messages_queued = self.queue.len();
        metrics.messages_evicted = self.queue.evicted();
    }
}

impl Drop for Actor {
    fn drop(&mut self) {
        self.cancel_reconnect_timer();
        if let Some(handshake) = self.handshake.take() {
            handshake.abort();
        }
    }
}

async fn next_frame(link: &mut Option<TransportLink>) -> Option<TransportResult<TransportMessage>> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn handshake(
    transport: &dyn Transport,
    credentials: &dyn CredentialProvider,
    mut request: ConnectRequest,
) -> TransportResult<TransportLink> {
    request.bearer_token = credentials.bearer_token().await?;
    transport.connect(request).await
}
