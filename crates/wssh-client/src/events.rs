//! Lifecycle callbacks for a client session.
//!
//! Callbacks are invoked only from the session's driver task, one at a
//! time, in event order. Per session, `on_connect` fires at most once and
//! exactly one of `on_close` / `on_error` fires as the final callback.

use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::ClientError;

/// A lifecycle event, as delivered by [`Callbacks::channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Data(Vec<u8>),
    Closed,
    Error(ClientError),
}

impl SessionEvent {
    /// Whether this is the final event of a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Error(_))
    }
}

type Handler<T> = Box<dyn FnMut(T) + Send>;

/// Caller-supplied event handlers. Unset handlers ignore their event.
#[derive(Default)]
pub struct Callbacks {
    on_error: Option<Handler<ClientError>>,
    on_connect: Option<Handler<()>>,
    on_close: Option<Handler<()>>,
    on_data: Option<Handler<Vec<u8>>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(mut self, f: impl FnMut(ClientError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_connect(mut self, mut f: impl FnMut() + Send + 'static) -> Self {
        self.on_connect = Some(Box::new(move |()| f()));
        self
    }

    pub fn on_close(mut self, mut f: impl FnMut() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(move |()| f()));
        self
    }

    pub fn on_data(mut self, f: impl FnMut(Vec<u8>) + Send + 'static) -> Self {
        self.on_data = Some(Box::new(f));
        self
    }

    /// Callbacks that forward every event into an unbounded queue, for
    /// callers that prefer to `await` events instead of reacting in place.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let on_error = tx.clone();
        let on_connect = tx.clone();
        let on_close = tx.clone();
        let on_data = tx;

        let callbacks = Self::new()
            .on_error(move |e| {
                let _ = on_error.send(SessionEvent::Error(e));
            })
            .on_connect(move || {
                let _ = on_connect.send(SessionEvent::Connected);
            })
            .on_close(move || {
                let _ = on_close.send(SessionEvent::Closed);
            })
            .on_data(move |data| {
                let _ = on_data.send(SessionEvent::Data(data));
            });
        (callbacks, rx)
    }

    /// Deliver one event to its handler.
    pub(crate) fn emit(&mut self, event: SessionEvent) {
        trace!(?event, "dispatching session event");
        match event {
            SessionEvent::Connected => call(&mut self.on_connect, ()),
            SessionEvent::Data(data) => call(&mut self.on_data, data),
            SessionEvent::Closed => call(&mut self.on_close, ()),
            SessionEvent::Error(e) => call(&mut self.on_error, e),
        }
    }
}

fn call<T>(handler: &mut Option<Handler<T>>, value: T) {
    if let Some(f) = handler {
        f(value);
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_error", &self.on_error.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_data", &self.on_data.is_some())
            .finish()
    }
}
