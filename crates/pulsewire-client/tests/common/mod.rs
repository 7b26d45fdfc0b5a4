//! Shared fixtures for connection manager integration tests
//!
//! [`MockTransport`] follows a script of [`Step`]s, one per connection
//! attempt. Every accepted attempt hands the test a [`Peer`] holding the
//! server side of the link.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use pulsewire_client::{
    ClientConfig, ClientError, ClientEvent, ConnectionManager, Envelope, EventKind, NoCredentials,
    TransportError,
};
use pulsewire_transport_traits::{
    BoxFuture, ConnectRequest, CredentialProvider, Transport, TransportLink, TransportMessage,
    TransportResult, TransportType,
};

pub const ENDPOINT: &str = "ws://mock.invalid/stream";

/// How the mock answers one connection attempt
#[derive(Debug)]
pub enum Step {
    /// Fail with a transient connection error
    Refuse,
    /// Fail with the given error
    Fail(TransportError),
    /// Hand out a link immediately
    Accept,
    /// Hand out a link once the gate is notified
    AcceptAfter(Arc<Notify>),
    /// Never complete
    Hang,
}

/// Server side of one accepted link
#[derive(Debug)]
pub struct Peer {
    /// Frames written by the client
    pub outbound: mpsc::Receiver<TransportMessage>,
    /// Frames (or failures) delivered to the client
    pub inbound: mpsc::Sender<TransportResult<TransportMessage>>,
}

impl Peer {
    /// Next frame from the client, decoded
    pub async fn recv_envelope(&mut self) -> Envelope {
        let frame = tokio::time::timeout(Duration::from_secs(30), self.outbound.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the link");
        Envelope::from_slice(&frame.payload).expect("client sent a valid envelope")
    }

    /// Deliver an envelope to the client
    pub async fn deliver(&self, envelope: &Envelope) {
        self.deliver_raw(&envelope.to_json().unwrap()).await;
    }

    /// Deliver an arbitrary text frame to the client
    pub async fn deliver_raw(&self, text: &str) {
        self.inbound
            .send(Ok(TransportMessage::text(text)))
            .await
            .expect("client dropped the link");
    }
}

#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    tokens: Mutex<Vec<Option<String>>>,
    peers: mpsc::UnboundedSender<Peer>,
}

impl MockTransport {
    /// Mock that plays `steps` in order, then refuses every later attempt
    pub fn scripted(
        steps: impl IntoIterator<Item = Step>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
            peers,
        });
        (transport, accepted)
    }

    /// Mock that refuses every attempt
    pub fn refusing() -> Arc<Self> {
        Self::scripted(Vec::new()).0
    }

    /// Append steps to the script
    pub fn push(&self, step: Step) {
        self.script.lock().push_back(step);
    }

    /// Number of connection attempts made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Bearer tokens presented by each attempt, in order
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().clone()
    }

    fn accept(&self) -> TransportResult<TransportLink> {
        let (link, outbound, inbound) = TransportLink::pair(64);
        let _ = self.peers.send(Peer { outbound, inbound });
        Ok(link)
    }
}

impl Transport for MockTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Memory
    }

    fn connect(&self, request: ConnectRequest) -> BoxFuture<'_, TransportResult<TransportLink>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(request.bearer_token.clone());
        let step = self.script.lock().pop_front().unwrap_or(Step::Refuse);

        Box::pin(async move {
            match step {
                Step::Refuse => Err(TransportError::ConnectionFailed(
                    "connection refused".to_string(),
                )),
                Step::Fail(err) => Err(err),
                Step::Accept => self.accept(),
                Step::AcceptAfter(gate) => {
                    gate.notified().await;
                    self.accept()
                }
                Step::Hang => std::future::pending().await,
            }
        })
    }

    fn name(&self) -> Option<&str> {
        Some("mock")
    }
}

/// Config pointing at the mock, with short timers
pub fn config() -> ClientConfig {
    ClientConfig::client(ENDPOINT)
        .with_backoff(Duration::from_millis(100), Duration::from_millis(100))
        .with_ping_interval(Duration::from_secs(3600))
}

pub fn manager(config: ClientConfig, transport: Arc<MockTransport>) -> ConnectionManager {
    ConnectionManager::new(config, transport, Arc::new(NoCredentials)).unwrap()
}

pub fn manager_with_credentials(
    config: ClientConfig,
    transport: Arc<MockTransport>,
    credentials: Arc<dyn CredentialProvider>,
) -> ConnectionManager {
    ConnectionManager::new(config, transport, credentials).unwrap()
}

/// Forward every lifecycle event to a channel
pub fn record_events(manager: &ConnectionManager) -> mpsc::UnboundedReceiver<ClientEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::Reconnecting,
        EventKind::Error,
    ] {
        let tx = tx.clone();
        manager.on(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    rx
}

/// Wait for the first recorded error matching `predicate`
pub async fn next_error(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    predicate: impl Fn(&ClientError) -> bool,
) -> ClientError {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match events.recv().await {
                Some(ClientEvent::Error(err)) if predicate(&err) => return err,
                Some(_) => {}
                None => panic!("event stream ended"),
            }
        }
    })
    .await
    .expect("timed out waiting for an error event")
}

/// Yield to the actor until `condition` holds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
