//! The client session: connection lifecycle and event dispatch.
//!
//! A [`ClientSession`] walks one state machine per instance:
//!
//! ```text
//! Idle --connect--> Connecting --open ok--> Authenticating --auth ok--> Connected
//!                       |                         |                        |
//!                       +--------- error ---------+------- error ----------+--> Errored
//!                       +--------- close() -------+--- close()/remote close+--> Closed
//! ```
//!
//! All transport work happens on a driver task spawned by `connect()`. The
//! driver owns the transport channel and the callbacks; the session handle
//! talks to it through a command queue, so `send()` and `close()` never
//! block.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::auth::{AuthResult, Negotiator};
use crate::config::{ConnectionConfig, OutboundFraming, ValidatedConfig};
use crate::error::{AuthFailure, ClientError, ClientResult};
use crate::events::{Callbacks, SessionEvent};
use crate::stream::{Inbound, SessionStream};
use crate::transport::{Connector, TransportChannel, TransportEvent, WebSocketConnector};

/// How long a local close waits for the gateway to confirm.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle state of a [`ClientSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Authenticating,
    Connected,
    Closed,
    Errored,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// How the driver finished.
enum Ending {
    Closed,
    Failed(ClientError),
}

/// Shared session state. Every transition goes through here.
struct StateCell(Mutex<SessionState>);

impl StateCell {
    fn new() -> Self {
        Self(Mutex::new(SessionState::Idle))
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self) -> SessionState {
        *self.lock()
    }

    /// Move `from -> to`. Fails if another transition got there first.
    fn advance(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.lock();
        if *state != from {
            return false;
        }
        trace!(%from, %to, "session state");
        *state = to;
        true
    }

    /// Mark the session closed on the caller's behalf. Returns the state
    /// being left, or `None` if the session had already ended.
    fn begin_close(&self) -> Option<SessionState> {
        let mut state = self.lock();
        if state.is_terminal() {
            return None;
        }
        let previous = *state;
        trace!(from = %previous, "session closing");
        *state = SessionState::Closed;
        Some(previous)
    }

    /// Record the terminal state and pick the terminal event. A close
    /// requested by the caller wins over a late failure.
    fn settle(&self, ending: Ending) -> SessionEvent {
        let mut state = self.lock();
        if *state == SessionState::Closed {
            if let Ending::Failed(e) = ending {
                debug!("session failed after close was requested: {e}");
            }
            return SessionEvent::Closed;
        }
        match ending {
            Ending::Closed => {
                *state = SessionState::Closed;
                SessionEvent::Closed
            }
            Ending::Failed(e) => {
                *state = SessionState::Errored;
                SessionEvent::Error(e)
            }
        }
    }
}

/// Requests from the session handle to its driver.
#[derive(Debug)]
enum Command {
    Send(Vec<u8>),
    Resize { cols: u16, rows: u16 },
    Close,
}

#[derive(Default)]
struct Setup {
    /// Present until `connect()` hands them to the driver.
    callbacks: Option<Callbacks>,
    commands: Option<mpsc::UnboundedSender<Command>>,
}

/// An SSH session through a WebSocket gateway.
///
/// Create one per connection; an instance is never reused after it ends.
pub struct ClientSession {
    state: Arc<StateCell>,
    connector: Arc<dyn Connector>,
    setup: Mutex<Setup>,
}

impl ClientSession {
    /// A session that reaches the gateway over WebSocket.
    pub fn new(callbacks: Callbacks) -> Self {
        Self::with_connector(WebSocketConnector, callbacks)
    }

    /// A session that opens its transport through `connector`.
    pub fn with_connector(connector: impl Connector, callbacks: Callbacks) -> Self {
        Self {
            state: Arc::new(StateCell::new()),
            connector: Arc::new(connector),
            setup: Mutex::new(Setup {
                callbacks: Some(callbacks),
                commands: None,
            }),
        }
    }

    fn setup(&self) -> MutexGuard<'_, Setup> {
        self.setup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start connecting. Returns immediately; the outcome arrives through
    /// the callbacks. An invalid configuration is reported through
    /// `on_error` before this returns, and no transport is opened.
    ///
    /// Must be called from within a tokio runtime, once per instance.
    pub fn connect(&self, config: ConnectionConfig) -> ClientResult<()> {
        let runtime = Handle::try_current().map_err(|_| {
            ClientError::Precondition("connect() must be called within a tokio runtime".into())
        })?;

        let mut setup = self.setup();
        let current = self.state.get();
        if current != SessionState::Idle {
            return Err(ClientError::Precondition(format!(
                "connect() on a session that is already {current}"
            )));
        }

        let validated = match config.validate() {
            Ok(validated) => validated,
            Err(e) => {
                if !self.state.advance(SessionState::Idle, SessionState::Errored) {
                    return Err(ClientError::Precondition("session is no longer idle".into()));
                }
                warn!("rejecting connection config: {e}");
                let callbacks = setup.callbacks.take();
                drop(setup);
                if let Some(mut callbacks) = callbacks {
                    callbacks.emit(SessionEvent::Error(e));
                }
                return Ok(());
            }
        };

        if !self.state.advance(SessionState::Idle, SessionState::Connecting) {
            return Err(ClientError::Precondition("session is no longer idle".into()));
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        setup.commands = Some(commands_tx);
        let driver = Driver {
            state: self.state.clone(),
            connector: self.connector.clone(),
            callbacks: setup.callbacks.take().unwrap_or_default(),
            commands: commands_rx,
        };
        runtime.spawn(driver.run(validated));
        Ok(())
    }

    /// Forward session bytes to the remote shell.
    ///
    /// Valid only while connected. An empty buffer is accepted and sends
    /// nothing.
    pub fn send(&self, data: &[u8]) -> ClientResult<()> {
        if self.state.get() != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        if data.is_empty() {
            return Ok(());
        }
        self.command(Command::Send(data.to_vec()))
    }

    /// Change the remote pty window size. Valid only while connected.
    pub fn resize(&self, cols: u16, rows: u16) -> ClientResult<()> {
        if self.state.get() != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        if cols == 0 || rows == 0 {
            return Err(ClientError::Precondition(format!(
                "invalid window size {cols}x{rows}"
            )));
        }
        self.command(Command::Resize { cols, rows })
    }

    /// Close the session. Idempotent; `on_close` fires once, after the
    /// transport close handshake.
    pub fn close(&self) {
        let Some(previous) = self.state.begin_close() else {
            trace!("close() on an ended session");
            return;
        };
        debug!(from = %previous, "closing session");

        let mut setup = self.setup();
        if previous == SessionState::Idle {
            let callbacks = setup.callbacks.take();
            drop(setup);
            if let Some(mut callbacks) = callbacks {
                callbacks.emit(SessionEvent::Closed);
            }
        } else if let Some(commands) = &setup.commands {
            // A driver that already exited has settled on its own.
            let _ = commands.send(Command::Close);
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    fn command(&self, command: Command) -> ClientResult<()> {
        let setup = self.setup();
        let commands = setup.commands.as_ref().ok_or(ClientError::NotConnected)?;
        commands.send(command).map_err(|_| ClientError::NotConnected)
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Owns the transport channel and the callbacks for one session.
struct Driver {
    state: Arc<StateCell>,
    connector: Arc<dyn Connector>,
    callbacks: Callbacks,
    commands: mpsc::UnboundedReceiver<Command>,
}

/// How the driver finished, plus a transport that still needs its close
/// handshake once the terminal event is out.
type Finish = (Ending, Option<TransportChannel>);

impl Driver {
    async fn run(mut self, config: ValidatedConfig) {
        let (ending, mut linger) = self.drive(&config).await;
        let event = self.state.settle(ending);
        match &event {
            SessionEvent::Error(e) => warn!("session to {} ended: {e}", config.target.hostname),
            _ => info!("session to {} closed", config.target.hostname),
        }

        // A caller-requested close reports only after the handshake.
        if event == SessionEvent::Closed {
            if let Some(channel) = linger.as_mut() {
                shutdown(channel).await;
            }
            linger = None;
        }

        let Driver { mut callbacks, .. } = self;
        callbacks.emit(event);
        drop(callbacks);

        if let Some(mut channel) = linger {
            shutdown(&mut channel).await;
        }
    }

    async fn drive(&mut self, config: &ValidatedConfig) -> Finish {
        debug!(endpoint = %config.endpoint, "opening transport");
        let opened = tokio::select! {
            _ = wait_for_close(&mut self.commands) => return (Ending::Closed, None),
            opened = self.connector.open(&config.endpoint) => opened,
        };
        let mut channel = match opened {
            Ok(channel) => channel,
            Err(e) => return (Ending::Failed(ClientError::TransportOpen(e.to_string())), None),
        };

        if !self
            .state
            .advance(SessionState::Connecting, SessionState::Authenticating)
        {
            return (Ending::Closed, Some(channel));
        }

        let negotiator = Negotiator::new(config);
        let outcome = tokio::select! {
            _ = wait_for_close(&mut self.commands) => None,
            result = negotiator.run(&mut channel) => Some(result),
        };
        match outcome {
            Some(AuthResult::Authenticated(handle)) => {
                debug!(session_id = ?handle.session_id, "gateway accepted session");
            }
            Some(AuthResult::Failed(failure)) => {
                let linger = match &failure {
                    AuthFailure::Transport(_) => None,
                    _ => Some(channel),
                };
                return (Ending::Failed(ClientError::Auth(failure)), linger);
            }
            None => return (Ending::Closed, Some(channel)),
        }

        if !self
            .state
            .advance(SessionState::Authenticating, SessionState::Connected)
        {
            return (Ending::Closed, Some(channel));
        }
        info!(
            "connected to {}@{}:{}",
            config.target.username, config.target.hostname, config.target.port
        );
        self.callbacks.emit(SessionEvent::Connected);

        let (ending, open) = self.relay(&mut channel, config.framing).await;
        (ending, open.then_some(channel))
    }

    /// Shuttle traffic between the caller and the gateway until either side
    /// ends the session. The flag is set when the transport is still open.
    async fn relay(
        &mut self,
        channel: &mut TransportChannel,
        framing: OutboundFraming,
    ) -> (Ending, bool) {
        let mut stream = SessionStream::new(framing);
        let ending = loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Send(data)) => {
                        let frame = match stream.frame(data) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!("failed to encode data: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = channel.sink.send(frame).await {
                            break (Ending::Failed(ClientError::Runtime(e.to_string())), false);
                        }
                    }
                    Some(Command::Resize { cols, rows }) => {
                        let frame = match stream.frame_resize(cols, rows) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!("failed to encode resize: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = channel.sink.send(frame).await {
                            break (Ending::Failed(ClientError::Runtime(e.to_string())), false);
                        }
                    }
                    Some(Command::Close) | None => break (Ending::Closed, true),
                },

                event = channel.events.recv() => match event.unwrap_or(TransportEvent::Closed) {
                    TransportEvent::Message(message) => match stream.decode(message) {
                        Inbound::Data(data) => {
                            if self.state.get() == SessionState::Connected {
                                self.callbacks.emit(SessionEvent::Data(data));
                            }
                        }
                        Inbound::RemoteError(reason) => {
                            break (Ending::Failed(ClientError::Runtime(reason)), true);
                        }
                        Inbound::Ignored => {}
                    },
                    TransportEvent::Closed => {
                        debug!("gateway closed the session");
                        break (Ending::Closed, false);
                    }
                    TransportEvent::Error(reason) => {
                        break (Ending::Failed(ClientError::Runtime(reason)), false);
                    }
                },
            }
        };

        let stats = stream.stats();
        debug!(
            bytes_in = stats.bytes_in,
            bytes_out = stats.bytes_out,
            frames_in = stats.frames_in,
            frames_out = stats.frames_out,
            "session stream finished"
        );
        ending
    }
}

/// Resolve once the caller asks to close (or drops the session).
async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>) {
    loop {
        match commands.recv().await {
            Some(Command::Close) | None => return,
            Some(other) => trace!(?other, "dropping command before connect"),
        }
    }
}

/// Run the transport close handshake, waiting briefly for confirmation.
async fn shutdown(channel: &mut TransportChannel) {
    if let Err(e) = channel.close().await {
        debug!("transport close failed: {e}");
        return;
    }

    let confirmed = time::timeout(CLOSE_GRACE, async {
        loop {
            match channel.next_event().await {
                TransportEvent::Closed | TransportEvent::Error(_) => return,
                TransportEvent::Message(_) => {}
            }
        }
    })
    .await;
    if confirmed.is_err() {
        warn!("gateway did not confirm close within {CLOSE_GRACE:?}");
    }
}
