//! WebSocket [`Transport`] implementation.

use futures::StreamExt as _;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, info};
use url::Url;

use pulsewire_transport_traits::{
    BoxFuture, ConnectRequest, Transport, TransportError, TransportLink, TransportResult,
    TransportType,
};

use crate::config::WebSocketTransportConfig;
use crate::tasks::{spawn_reader_task, spawn_writer_task};

/// Opens WebSocket connections and hands them out as [`TransportLink`]s.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketTransportConfig,
}

impl WebSocketTransport {
    /// Create a transport with explicit tuning.
    pub fn new(config: WebSocketTransportConfig) -> TransportResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The transport's configuration.
    pub fn config(&self) -> &WebSocketTransportConfig {
        &self.config
    }

    async fn open(&self, request: ConnectRequest) -> TransportResult<TransportLink> {
        let endpoint = normalize_endpoint(&request.url, request.tls)?;
        info!(%endpoint, "Connecting to WebSocket server");

        let mut upgrade = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        if let Some(token) = request.bearer_token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                TransportError::AuthenticationFailed(
                    "bearer token contains characters not allowed in a header".to_string(),
                )
            })?;
            upgrade.headers_mut().insert(AUTHORIZATION, value);
        }

        let ws_config =
            WebSocketConfig::default().max_message_size(Some(self.config.max_message_size));

        let (stream, response) = connect_async_with_config(upgrade, Some(ws_config), false)
            .await
            .map_err(map_handshake_error)?;
        debug!(%endpoint, status = %response.status(), "Upgrade accepted");

        let (sink, source) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.channel_capacity);

        let label = endpoint.to_string();
        spawn_writer_task(sink, outbound_rx, inbound_tx.downgrade(), label.clone());
        spawn_reader_task(source, inbound_tx, label);

        info!(%endpoint, "WebSocket connected");
        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

impl Transport for WebSocketTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::WebSocket
    }

    fn connect(&self, request: ConnectRequest) -> BoxFuture<'_, TransportResult<TransportLink>> {
        Box::pin(self.open(request))
    }

    fn name(&self) -> Option<&str> {
        Some("websocket")
    }
}

/// Resolve the URL actually dialled.
///
/// `http`/`https` map to `ws`/`wss`. When `tls` is set the result is always
/// `wss`, whatever scheme was supplied. Any other scheme is rejected.
pub fn normalize_endpoint(raw: &str, tls: bool) -> TransportResult<Url> {
    let mut url = Url::parse(raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;

    let secure = match url.scheme() {
        "ws" | "http" => tls,
        "wss" | "https" => true,
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme '{other}' in {raw}"
            )));
        }
    };

    let scheme = if secure { "wss" } else { "ws" };
    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|()| TransportError::InvalidUrl(format!("cannot use {scheme} for {raw}")))?;
    }
    Ok(url)
}

fn map_handshake_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            TransportError::AuthenticationFailed(format!(
                "server rejected credentials with {}",
                response.status()
            ))
        }
        WsError::Http(response) => {
            TransportError::ConnectionFailed(format!("upgrade rejected with {}", response.status()))
        }
        WsError::Url(e) => TransportError::InvalidUrl(e.to_string()),
        WsError::Tls(e) => TransportError::Tls(e.to_string()),
        WsError::Io(e) => TransportError::ConnectionFailed(e.to_string()),
        other => TransportError::ConnectionFailed(format!("WebSocket connection failed: {other}")),
    }
}
