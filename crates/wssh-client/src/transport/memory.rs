//! In-process transport channel.
//!
//! [`pair`] returns a connector for the client side and a [`MemoryGateway`]
//! that plays the gateway: it observes every frame the client writes, in
//! order, and injects inbound messages, closes and failures. A local close
//! is confirmed immediately, like a well-behaved WebSocket peer, unless the
//! gateway was told to [`ignore_close`](MemoryGateway::ignore_close).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use wssh_core::{codec, ClientMessage, GatewayMessage};

use super::{
    BoxFuture, Connector, MessageSink, TransportChannel, TransportError, TransportEvent,
    TransportMessage, TransportResult, EVENT_BUFFER,
};

/// What the gateway side observes from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayFrame {
    Message(TransportMessage),
    Close,
}

enum Behavior {
    Accept(Mutex<Option<TransportChannel>>),
    Refuse(String),
    Stall,
}

/// Counts `open()` calls on a [`MemoryConnector`].
#[derive(Debug, Clone, Default)]
pub struct OpenCounter(Arc<AtomicUsize>);

impl OpenCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Client side of an in-process transport.
pub struct MemoryConnector {
    behavior: Behavior,
    opens: OpenCounter,
}

impl MemoryConnector {
    /// A connector whose every `open()` fails with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Refuse(reason.into()),
            opens: OpenCounter::default(),
        }
    }

    /// A connector whose `open()` never completes.
    pub fn stalled() -> Self {
        Self {
            behavior: Behavior::Stall,
            opens: OpenCounter::default(),
        }
    }

    pub fn open_counter(&self) -> OpenCounter {
        self.opens.clone()
    }
}

/// Create a connected client/gateway pair. The connector opens exactly once.
pub fn pair() -> (MemoryConnector, MemoryGateway) {
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    let mute = Arc::new(AtomicBool::new(false));
    let sink = MemorySink {
        frames: frames_tx,
        events: events_tx.clone(),
        mute: Arc::clone(&mute),
    };
    let channel = TransportChannel::new(Box::new(sink), events_rx);

    let connector = MemoryConnector {
        behavior: Behavior::Accept(Mutex::new(Some(channel))),
        opens: OpenCounter::default(),
    };
    let gateway = MemoryGateway {
        to_client: events_tx,
        from_client: frames_rx,
        mute,
    };
    (connector, gateway)
}

impl Connector for MemoryConnector {
    fn open<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, TransportResult<TransportChannel>> {
        Box::pin(async move {
            self.opens.0.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Accept(slot) => slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .ok_or_else(|| TransportError(format!("{endpoint}: channel already opened"))),
                Behavior::Refuse(reason) => Err(TransportError(reason.clone())),
                Behavior::Stall => std::future::pending().await,
            }
        })
    }
}

struct MemorySink {
    frames: mpsc::UnboundedSender<GatewayFrame>,
    events: mpsc::Sender<TransportEvent>,
    mute: Arc<AtomicBool>,
}

impl MessageSink for MemorySink {
    fn send(&mut self, message: TransportMessage) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.frames
                .send(GatewayFrame::Message(message))
                .map_err(|_| TransportError("gateway went away".into()))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.frames
                .send(GatewayFrame::Close)
                .map_err(|_| TransportError("gateway went away".into()))?;
            if !self.mute.load(Ordering::SeqCst) {
                let _ = self.events.send(TransportEvent::Closed).await;
            }
            Ok(())
        })
    }
}

/// Gateway side of an in-process transport.
pub struct MemoryGateway {
    to_client: mpsc::Sender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<GatewayFrame>,
    mute: Arc<AtomicBool>,
}

impl MemoryGateway {
    /// Next frame written by the client, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<GatewayFrame> {
        self.from_client.recv().await
    }

    /// Next frame, decoded as a control message. `None` if the next frame is
    /// not a decodable text frame.
    pub async fn recv_control(&mut self) -> Option<ClientMessage> {
        match self.recv().await? {
            GatewayFrame::Message(TransportMessage::Text(text)) => codec::decode_client(&text).ok(),
            _ => None,
        }
    }

    /// Frames already written by the client, without waiting.
    pub fn drain(&mut self) -> Vec<GatewayFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub async fn send(&self, message: &GatewayMessage) {
        if let Ok(text) = codec::encode_gateway(message) {
            self.send_text(text).await;
        }
    }

    pub async fn send_text(&self, text: impl Into<String>) {
        self.push(TransportEvent::Message(TransportMessage::Text(text.into())))
            .await;
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) {
        self.push(TransportEvent::Message(TransportMessage::Binary(data.into())))
            .await;
    }

    /// Stop confirming local closes, like a peer that never answers the
    /// close frame.
    pub fn ignore_close(&self) {
        self.mute.store(true, Ordering::SeqCst);
    }

    /// Close the transport from the gateway side.
    pub async fn close(&self) {
        self.push(TransportEvent::Closed).await;
    }

    /// Fail the transport with `reason`.
    pub async fn fail(&self, reason: impl Into<String>) {
        self.push(TransportEvent::Error(reason.into())).await;
    }

    async fn push(&self, event: TransportEvent) {
        let _ = self.to_client.send(event).await;
    }
}
