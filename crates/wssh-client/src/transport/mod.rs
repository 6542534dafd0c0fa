//! Transport channel abstraction for wssh.
//!
//! A transport channel is a message-based duplex connection to the gateway.
//! Opening one yields a [`TransportChannel`]: a sink half for outbound
//! messages and an ordered queue of inbound [`TransportEvent`]s, fed by a
//! reader owned by the implementation. Implementations:
//! - [`websocket`]: `ws://` / `wss://` via tokio-tungstenite
//! - [`memory`]: an in-process pair for driving sessions deterministically

pub mod memory;
pub mod websocket;

pub use websocket::WebSocketConnector;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::{ClientError, ClientResult};

/// Capacity of the inbound event queue between a reader and its session.
pub(crate) const EVENT_BUFFER: usize = 256;

/// Boxed `Send` future returned by transport trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

pub type TransportResult<T> = Result<T, TransportError>;

/// One transport message, preserving the frame kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Inbound transport events, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(TransportMessage),
    /// The peer closed the transport (or confirmed our close).
    Closed,
    /// The transport failed; no further events follow.
    Error(String),
}

/// Outbound half of a transport channel.
pub trait MessageSink: Send {
    /// Send one message. Messages are written in call order.
    fn send(&mut self, message: TransportMessage) -> BoxFuture<'_, TransportResult<()>>;

    /// Begin the close handshake. Confirmation arrives as [`TransportEvent::Closed`].
    fn close(&mut self) -> BoxFuture<'_, TransportResult<()>>;
}

/// Opens transport channels to an endpoint.
pub trait Connector: Send + Sync + 'static {
    fn open<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, TransportResult<TransportChannel>>;
}

/// An open transport channel, exclusively owned by one session.
pub struct TransportChannel {
    pub(crate) sink: Box<dyn MessageSink>,
    pub(crate) events: mpsc::Receiver<TransportEvent>,
}

impl TransportChannel {
    pub fn new(sink: Box<dyn MessageSink>, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self { sink, events }
    }

    pub async fn send(&mut self, message: TransportMessage) -> TransportResult<()> {
        self.sink.send(message).await
    }

    /// Next inbound event. A reader that went away reads as [`TransportEvent::Closed`].
    pub async fn next_event(&mut self) -> TransportEvent {
        self.events.recv().await.unwrap_or(TransportEvent::Closed)
    }

    pub async fn close(&mut self) -> TransportResult<()> {
        self.sink.close().await
    }
}

/// Check that `endpoint` is a WebSocket URL with a host.
pub fn validate_endpoint(endpoint: &str) -> ClientResult<()> {
    let lower = endpoint.to_lowercase();
    let rest = if let Some(rest) = lower.strip_prefix("wss://") {
        rest
    } else if let Some(rest) = lower.strip_prefix("ws://") {
        rest
    } else {
        return Err(ClientError::Config(format!(
            "unsupported endpoint: '{endpoint}' (expected ws:// or wss://)"
        )));
    };

    let host = rest.split(['/', '?']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ClientError::Config(format!("endpoint '{endpoint}' has no host")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_websocket_urls() {
        assert!(validate_endpoint("ws://localhost:5000/remote").is_ok());
        assert!(validate_endpoint("WSS://example.com/wssh?key=secret").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(validate_endpoint("http://example.com").is_err());
        assert!(validate_endpoint("https://example.com:4433").is_err());
        assert!(validate_endpoint("localhost:5000").is_err());
    }

    #[test]
    fn rejects_missing_host() {
        assert!(validate_endpoint("ws://").is_err());
        assert!(validate_endpoint("ws:///remote").is_err());
    }
}
