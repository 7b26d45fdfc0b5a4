//! # pulsewire Client
//!
//! A resilient client for one long-lived, bidirectional message stream.
//! Callers get a single logical connection that survives network failures:
//! it reconnects with jittered exponential backoff, stops hammering a dead
//! endpoint through a circuit breaker, holds outbound messages while offline
//! and probes liveness with echoed health checks.
//!
//! ## Features
//!
//! - **Reconnection**: exponential backoff with jitter and an optional budget
//! - **Circuit breaker**: closed, open and half-open states with a single trial
//! - **Offline queue**: bounded, order-preserving, flushed on reconnect
//! - **Health monitoring**: periodic `health_check` probes with round-trip latency
//! - **Typed events**: listeners for lifecycle events and per-type messages
//! - **Metrics**: point-in-time snapshots of traffic, latency and errors
//!
//! ## Architecture
//!
//! ```text
//!  ConnectionManager (cloneable handle)
//!        │ commands
//!        ▼
//!  actor task ── CircuitBreaker, ReconnectionPolicy, MessageQueue, HealthMonitor
//!        │                 │
//!        │ TransportLink   └── EventDispatcher ──▶ listeners
//!        ▼
//!  Transport (pulsewire-websocket, or any implementation)
//! ```
//!
//! Every state change is made by the actor, one command at a time. Timer and
//! handshake tasks only post commands back, tagged with an epoch so that late
//! results from an abandoned attempt are ignored.
//!
//! ## Messages
//!
//! Frames are JSON [`Envelope`]s: `{"type", "payload", "id", "timestamp"}`.
//! Envelopes of type `health_check` are liveness probes and never reach
//! listeners.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

pub mod circuit_breaker;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod health;
pub mod manager;
pub mod metrics;
pub mod queue;
pub mod reconnect;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use config::{ClientConfig, ConfigError};
pub use dispatcher::{ClientEvent, EventDispatcher, EventKind, HandlerId};
pub use envelope::{Envelope, HEALTH_CHECK_TYPE};
pub use error::{ClientError, ClientResult};
pub use health::{HealthAction, HealthMonitor};
pub use manager::{ConnectionManager, ConnectionState, SendOutcome};
pub use metrics::{ConnectionMetrics, ErrorRecord, LatencyTracker};
pub use queue::{EvictionPolicy, MessageQueue, QueuedMessage};
pub use reconnect::ReconnectionPolicy;

pub use pulsewire_transport_traits::{
    CredentialProvider, NoCredentials, StaticToken, Transport, TransportError,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
