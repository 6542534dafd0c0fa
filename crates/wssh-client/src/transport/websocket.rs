//! WebSocket transport channel.
//!
//! Text frames and binary frames pass through unchanged as
//! [`TransportMessage`]s. A reader task owns the read half and forwards
//! frames, in order, into the channel's event queue; pings are answered
//! from the reader so a silent session stays alive.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::{
    BoxFuture, Connector, MessageSink, TransportChannel, TransportError, TransportEvent,
    TransportMessage, TransportResult, EVENT_BUFFER,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

/// Opens WebSocket transport channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn open<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, TransportResult<TransportChannel>> {
        Box::pin(async move {
            if endpoint.to_lowercase().starts_with("wss://") {
                // Both ring and aws-lc may be linked; pin the provider once.
                let _ = rustls::crypto::ring::default_provider().install_default();
            }

            let (ws_stream, _response) = connect_async(endpoint)
                .await
                .map_err(|e| TransportError(format!("WebSocket connect error: {e}")))?;

            info!(endpoint, "WebSocket connected");

            let (ws_sink, ws_read) = ws_stream.split();
            let ws_sink = Arc::new(Mutex::new(ws_sink));
            let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

            let reader = tokio::spawn(read_loop(ws_read, events_tx, ws_sink.clone()));

            Ok(TransportChannel::new(
                Box::new(WebSocketSink {
                    sink: ws_sink,
                    reader,
                }),
                events_rx,
            ))
        })
    }
}

/// Forward inbound frames into the event queue until the socket ends.
async fn read_loop(
    mut ws_read: SplitStream<WsStream>,
    events: mpsc::Sender<TransportEvent>,
    ws_sink: SharedSink,
) {
    while let Some(msg) = ws_read.next().await {
        let message = match msg {
            Ok(Message::Binary(data)) => TransportMessage::Binary(data),
            Ok(Message::Text(text)) => TransportMessage::Text(text),
            Ok(Message::Close(frame)) => {
                debug!(?frame, "WebSocket close frame received");
                let _ = events.send(TransportEvent::Closed).await;
                return;
            }
            Ok(Message::Ping(payload)) => {
                let mut sink = ws_sink.lock().await;
                if let Err(e) = sink.send(Message::Pong(payload)).await {
                    warn!("failed to answer ping: {}", e);
                }
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket read error: {}", e);
                let _ = events.send(TransportEvent::Error(e.to_string())).await;
                return;
            }
        };

        if events.send(TransportEvent::Message(message)).await.is_err() {
            trace!("event queue dropped, stopping reader");
            return;
        }
    }

    debug!("WebSocket stream ended without close frame");
    let _ = events.send(TransportEvent::Closed).await;
}

struct WebSocketSink {
    sink: SharedSink,
    reader: JoinHandle<()>,
}

impl MessageSink for WebSocketSink {
    fn send(&mut self, message: TransportMessage) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let frame = match message {
                TransportMessage::Text(text) => Message::Text(text),
                TransportMessage::Binary(data) => Message::Binary(data),
            };
            let mut sink = self.sink.lock().await;
            sink.send(frame)
                .await
                .map_err(|e| TransportError(format!("WS send error: {e}")))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Close(None))
                .await
                .map_err(|e| TransportError(format!("WS close error: {e}")))
        })
    }
}

impl Drop for WebSocketSink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
