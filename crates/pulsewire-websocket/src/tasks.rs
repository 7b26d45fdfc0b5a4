//! Reader and writer pumps for one WebSocket connection
//!
//! Each connection gets exactly two tasks. The reader is the only consumer
//! of the stream half and the writer the only producer on the sink half, so
//! the caller never touches the socket and never needs a lock around it.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use tracing::{debug, trace, warn};

use pulsewire_transport_traits::{MessageKind, TransportError, TransportMessage, TransportResult};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Forward frames from the socket into the link's inbound channel.
///
/// Ends when the peer closes, the socket errors, or the link owner drops its
/// receiver. Dropping `inbound_tx` on exit is what signals closure upstream.
pub(crate) fn spawn_reader_task(
    mut source: WsSource,
    inbound_tx: mpsc::Sender<TransportResult<TransportMessage>>,
    endpoint: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        debug!(%endpoint, "Reader task started");

        loop {
            let next = tokio::select! {
                _ = inbound_tx.closed() => {
                    debug!(%endpoint, "Link dropped, reader stopping");
                    break;
                }
                next = source.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    trace!(%endpoint, bytes = text.len(), "Received text frame");
                    let frame = TransportMessage::text(text.as_str());
                    if inbound_tx.send(Ok(frame)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    trace!(%endpoint, bytes = data.len(), "Received binary frame");
                    if inbound_tx
                        .send(Ok(TransportMessage::binary(data)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite answers pings on its own
                    trace!(%endpoint, "Ping");
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(%endpoint, ?frame, "Peer closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(%endpoint, error = %e, "WebSocket error");
                    let _ = inbound_tx
                        .send(Err(TransportError::ConnectionLost(e.to_string())))
                        .await;
                    break;
                }
                None => {
                    debug!("Stream from {} ended", endpoint);
                    break;
                }
            }
        }
    })
}

/// Write frames from the link's outbound channel to the socket.
///
/// When the link owner drops its sender, a close frame is sent and the task
/// exits. Write failures are reported through `error_tx` so the owner sees
/// them on the inbound channel. The sender is weak so that the reader alone
/// decides when the inbound channel closes.
pub(crate) fn spawn_writer_task(
    mut sink: WsSink,
    mut outbound_rx: mpsc::Receiver<TransportMessage>,
    error_tx: mpsc::WeakSender<TransportResult<TransportMessage>>,
    endpoint: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        debug!(%endpoint, "Writer task started");

        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame.kind {
                MessageKind::Text => match String::from_utf8(frame.payload.to_vec()) {
                    Ok(text) => Message::Text(text.into()),
                    Err(_) => {
                        warn!(%endpoint, "Dropping text frame with invalid UTF-8");
                        continue;
                    }
                },
                MessageKind::Binary => Message::Binary(frame.payload),
            };

            if let Err(e) = sink.send(message).await {
                warn!(%endpoint, error = %e, "Write failed");
                if let Some(tx) = error_tx.upgrade() {
                    let _ = tx
                        .send(Err(TransportError::SendFailed(e.to_string())))
                        .await;
                }
                return;
            }
        }

        debug!(%endpoint, "Outbound channel closed, sending close frame");
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    })
}
