//! Core transport traits.

use std::future::Future;
use std::pin::Pin;

use crate::error::TransportResult;
use crate::types::{ConnectRequest, TransportLink, TransportType};

/// A boxed, sendable future, as returned by [`Transport`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core trait for all transport implementations.
///
/// A transport knows how to turn a [`ConnectRequest`] into a live
/// [`TransportLink`]. It does not retry, queue, or track state; those concerns
/// belong to the connection manager that owns the link.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Performs the handshake and returns the frame channels for the new connection.
    ///
    /// The returned future is not bounded by a timeout; callers apply their own.
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'_, TransportResult<TransportLink>>;

    /// Returns a short label for log lines, if the transport has one.
    fn name(&self) -> Option<&str> {
        None
    }
}
