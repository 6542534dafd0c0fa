//! wssh-client: SSH sessions tunneled through a WebSocket gateway.
//!
//! A [`ClientSession`] opens a WebSocket to a gateway, authenticates against
//! the target SSH host with a password or a private key, and then relays
//! terminal bytes both ways. Everything the session has to say arrives
//! through [`Callbacks`].
//!
//! # Quick Start
//!
//! ```no_run
//! use wssh_client::{Callbacks, ClientSession, ConnectionConfig, SessionEvent};
//!
//! # async fn example() -> wssh_client::ClientResult<()> {
//! let (callbacks, mut events) = Callbacks::channel();
//! let session = ClientSession::new(callbacks);
//! session.connect(ConnectionConfig::password(
//!     "wss://gateway.example.com/remote",
//!     "localhost",
//!     "root",
//!     "secretpassword",
//! ))?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Connected => session.send(b"ls -la\n")?,
//!         SessionEvent::Data(bytes) => print!("{}", String::from_utf8_lossy(&bytes)),
//!         SessionEvent::Closed => break,
//!         SessionEvent::Error(e) => return Err(e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod stream;
pub mod transport;

// Re-export primary public types.
pub use auth::{AuthResult, Negotiator, SessionHandle};
pub use client::{ClientSession, SessionState};
pub use config::{
    AuthenticationMethod, ConnectionConfig, Credentials, OutboundFraming, ValidatedConfig,
    DEFAULT_AUTH_TIMEOUT, DEFAULT_SSH_PORT,
};
pub use error::{AuthFailure, ClientError, ClientResult};
pub use events::{Callbacks, SessionEvent};
pub use stream::{Inbound, SessionStream, StreamStats};
pub use transport::{
    Connector, TransportChannel, TransportError, TransportEvent, TransportMessage,
    WebSocketConnector,
};
