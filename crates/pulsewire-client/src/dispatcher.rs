//! Typed event fan-out
//!
//! Listeners register against an [`EventKind`] and receive a borrowed
//! [`ClientEvent`]. Lifecycle events have fixed kinds; inbound business
//! messages are keyed by their envelope `type`.
//!
//! ## Delivery rules
//!
//! - Listeners for one kind run synchronously, in registration order.
//! - A panicking listener is caught. The remaining listeners still run, and
//!   the panic is re-emitted as a [`ClientError::Listener`] on the `error`
//!   kind. A panic inside an `error` listener is only logged, so a faulty
//!   error handler cannot recurse.
//! - The registry lock is not held while listeners run, so a listener may
//!   register or remove listeners (including itself). Such changes apply from
//!   the next emission.
//!
//! ## Example
//!
//! ```rust
//! use pulsewire_client::{ClientEvent, EventDispatcher, EventKind};
//!
//! let dispatcher = EventDispatcher::new();
//! let id = dispatcher.on(EventKind::message("alert"), |event| {
//!     if let ClientEvent::Message(envelope) = event {
//!         println!("alert: {}", envelope.payload);
//!     }
//! });
//! assert_eq!(dispatcher.listener_count(&EventKind::message("alert")), 1);
//! assert!(dispatcher.off(&EventKind::message("alert"), id));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::envelope::Envelope;
use crate::error::ClientError;

/// What a listener subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The connection was established
    Connect,
    /// An established connection ended
    Disconnect,
    /// A reconnection attempt was scheduled
    Reconnecting,
    /// Any failure, transient or terminal
    Error,
    /// An inbound envelope with this `type`
    Message(String),
}

impl EventKind {
    /// Kind for inbound envelopes of type `kind`
    pub fn message(kind: impl Into<String>) -> Self {
        Self::Message(kind.into())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Disconnect => write!(f, "disconnect"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Error => write!(f, "error"),
            Self::Message(kind) => write!(f, "{kind}"),
        }
    }
}

/// Payload delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Handshake completed
    Connect {
        /// Endpoint URL
        endpoint: String,
    },
    /// Connection ended, by request or by failure
    Disconnect {
        /// Human-readable cause
        reason: String,
    },
    /// Next attempt scheduled
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
        /// Delay before the attempt
        delay: Duration,
    },
    /// A failure
    Error(ClientError),
    /// An inbound business message
    Message(Envelope),
}

impl ClientEvent {
    /// The kind listeners must subscribe to in order to receive this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect { .. } => EventKind::Connect,
            Self::Disconnect { .. } => EventKind::Disconnect,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
            Self::Error(_) => EventKind::Error,
            Self::Message(envelope) => EventKind::Message(envelope.kind.clone()),
        }
    }
}

/// Identifies one registration, for [`EventDispatcher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Listener = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(HandlerId, Listener)>>,
}

/// Registry of listeners keyed by event kind. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        let counts: HashMap<String, usize> = registry
            .listeners
            .iter()
            .map(|(kind, list)| (kind.to_string(), list.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("listeners", &counts)
            .finish()
    }
}

impl EventDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`
    pub fn on<F>(&self, kind: EventKind, listener: F) -> HandlerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = HandlerId(registry.next_id);
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a registration. Returns `false` if it was not registered.
    pub fn off(&self, kind: &EventKind, id: HandlerId) -> bool {
        let mut registry = self.registry.lock();
        let Some(list) = registry.listeners.get_mut(kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler, _)| *handler != id);
        let removed = list.len() != before;
        if list.is_empty() {
            registry.listeners.remove(kind);
        }
        removed
    }

    /// Number of listeners registered for `kind`
    pub fn listener_count(&self, kind: &EventKind) -> usize {
        self.registry
            .lock()
            .listeners
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to its listeners. Returns how many were invoked.
    pub fn emit(&self, event: &ClientEvent) -> usize {
        let kind = event.kind();
        let listeners = self.snapshot(&kind);

        let mut failures = Vec::new();
        for listener in &listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(event))) {
                let message = panic_message(panic.as_ref());
                if kind == EventKind::Error {
                    error!(%message, "Error listener panicked");
                } else {
                    warn!(event = %kind, %message, "Listener panicked");
                    failures.push(ClientError::Listener {
                        event: kind.to_string(),
                        message,
                    });
                }
            }
        }

        for failure in failures {
            self.emit(&ClientEvent::Error(failure));
        }
        listeners.len()
    }

    fn snapshot(&self, kind: &EventKind) -> Vec<Listener> {
        self.registry
            .lock()
            .listeners
            .get(kind)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}
