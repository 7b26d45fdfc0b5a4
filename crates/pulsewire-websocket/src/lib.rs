//! # pulsewire WebSocket Transport
//!
//! WebSocket implementation of the pulsewire [`Transport`] seam, built on
//! `tokio-tungstenite` with rustls and the platform root store.
//!
//! ## Features
//!
//! - **Endpoint normalisation**: `http(s)://` is rewritten to `ws(s)://`, and
//!   requesting TLS upgrades `ws://` to `wss://`
//! - **Bearer authentication**: the credential token travels in the
//!   `Authorization` header of the upgrade request
//! - **Pump tasks**: one reader and one writer task per connection, exposed
//!   to the caller as a pair of bounded channels
//!
//! ## Example
//!
//! ```rust,no_run
//! use pulsewire_transport_traits::{ConnectRequest, Transport, TransportMessage};
//! use pulsewire_websocket::WebSocketTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = WebSocketTransport::default();
//! let mut link = transport
//!     .connect(ConnectRequest::new("ws://localhost:8080/stream"))
//!     .await?;
//!
//! link.outbound.send(TransportMessage::text("hello")).await?;
//! if let Some(Ok(frame)) = link.inbound.recv().await {
//!     println!("received {} bytes", frame.size());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`Transport`]: pulsewire_transport_traits::Transport

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

mod config;
mod tasks;
mod transport;

pub use config::WebSocketTransportConfig;
pub use transport::{WebSocketTransport, normalize_endpoint};
