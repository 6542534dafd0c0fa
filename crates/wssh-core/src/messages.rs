//! Control messages exchanged with a WebSocket-to-SSH gateway.
//!
//! Every control message travels as one JSON object in a WebSocket text
//! frame, keyed by its kind:
//!
//! ```text
//! {"auth": {"hostname": "localhost", "port": 22, "username": "root", "method": "password", ...}}
//! {"resize": {"width": 80, "height": 24}}
//! {"challenge": {"nonce": "9f2c..."}}
//! {"data": "ls\n"}
//! {"error": "Authentication failed."}
//! ```
//!
//! Raw session bytes travel in binary frames by default. A client configured
//! for text framing sends its input as `{"data"}` instead.

use serde::{Deserialize, Serialize};

/// Protocol identifier mixed into the public-key auth transcript.
pub const PROTOCOL_VERSION: &str = "wssh-v1";

/// Messages sent by the client to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate against the target SSH host.
    Auth(AuthRequest),
    /// Change the remote pty window size.
    Resize { width: u16, height: u16 },
    /// Session input as text, used when text framing is configured.
    Data(String),
}

/// Messages sent by the gateway to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Fresh nonce the client must bind its key signature to. Required before
    /// publickey auth; the client sends no key credential without one.
    Challenge { nonce: String },
    /// The SSH session is authenticated and the shell is running.
    AuthOk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Session output as text.
    Data(String),
    /// Any failure on the gateway side. During authentication this is a
    /// rejection; afterwards it terminates the session.
    Error(String),
}

/// Authentication request for the target host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    /// Terminal type requested for the remote pty.
    pub term: String,
    /// Remote command to execute instead of an interactive shell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub width: u16,
    pub height: u16,
    #[serde(flatten)]
    pub credential: AuthCredential,
}

/// The credential form carried by an [`AuthRequest`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum AuthCredential {
    Password {
        password: String,
    },
    Publickey {
        /// OpenSSH-format public key (`ssh-ed25519 AAAA...`).
        public_key: String,
        /// PEM-armored SSH signature over the auth transcript.
        signature: String,
    },
}

// Keep secrets out of logs.
impl std::fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { .. } => f
                .debug_struct("Password")
                .field("password", &"<redacted>")
                .finish(),
            Self::Publickey { public_key, .. } => f
                .debug_struct("Publickey")
                .field("public_key", public_key)
                .finish_non_exhaustive(),
        }
    }
}
