//! # pulsewire Transport Traits
//!
//! The transport seam for the pulsewire streaming client. The connection
//! manager in `pulsewire-client` never touches a socket directly; it asks a
//! [`Transport`] for a [`TransportLink`] and drives that link from its own
//! serialized event loop.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Traits**: [`Transport`], [`CredentialProvider`]
//! - **Types**: [`TransportType`], [`ConnectRequest`], [`TransportLink`], [`TransportMessage`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Config**: [`TimeoutConfig`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pulsewire_transport_traits::{ConnectRequest, Transport, TransportLink, TransportResult};
//!
//! #[derive(Debug)]
//! struct MyTransport;
//!
//! impl Transport for MyTransport {
//!     fn transport_type(&self) -> TransportType { TransportType::WebSocket }
//!     fn connect(&self, request: ConnectRequest) -> BoxFuture<'_, TransportResult<TransportLink>> {
//!         Box::pin(async move { /* handshake, spawn pumps, hand back the link */ })
//!     }
//! }
//! ```

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

mod config;
mod credentials;
mod error;
mod message;
mod traits;
mod types;

pub use config::TimeoutConfig;
pub use credentials::{CredentialProvider, NoCredentials, StaticToken};
pub use error::{TransportError, TransportResult};
pub use message::{MessageKind, TransportMessage};
pub use traits::{BoxFuture, Transport};
pub use types::{ConnectRequest, TransportLink, TransportType};
