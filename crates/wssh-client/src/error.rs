//! Client error taxonomy.
//!
//! Every lifecycle failure reaches the caller exactly once through the
//! session's `on_error` callback. Usage faults (`send()` outside a connected
//! session and the like) are returned synchronously instead.

use std::time::Duration;

use thiserror::Error;
use wssh_core::WsshError;

/// Why an authentication attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// The gateway or the target host refused the credentials.
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The private key is encrypted and no passphrase was supplied.
    #[error("private key is encrypted and no passphrase was provided")]
    PassphraseRequired,

    /// The passphrase did not decrypt the private key.
    #[error("private key decryption failed: {0}")]
    KeyDecryption(String),

    /// The private key could not be parsed or used for signing.
    #[error("unusable private key: {0}")]
    InvalidKey(String),

    /// No outcome arrived within the configured bound.
    #[error("no authentication outcome within {0:?}")]
    Timeout(Duration),

    /// The gateway broke the authentication exchange.
    #[error("authentication protocol error: {0}")]
    Protocol(String),

    /// The transport failed or closed mid-exchange.
    #[error("transport lost during authentication: {0}")]
    Transport(String),
}

impl From<WsshError> for AuthFailure {
    fn from(e: WsshError) -> Self {
        match e {
            WsshError::PassphraseRequired => AuthFailure::PassphraseRequired,
            WsshError::KeyDecryption(reason) => AuthFailure::KeyDecryption(reason),
            WsshError::InvalidKey(reason) | WsshError::Signature(reason) => {
                AuthFailure::InvalidKey(reason)
            }
            other => AuthFailure::Protocol(other.to_string()),
        }
    }
}

/// Errors surfaced by a [`ClientSession`](crate::ClientSession).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Invalid or missing configuration; no transport was opened.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The transport could not be established.
    #[error("transport open failed: {0}")]
    TransportOpen(String),

    /// Authentication did not succeed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthFailure),

    /// The session failed after it was connected.
    #[error("session i/o error: {0}")]
    Runtime(String),

    /// `send()` or `resize()` outside the connected state.
    #[error("not connected")]
    NotConnected,

    /// An operation that is not valid in the session's current state.
    #[error("invalid operation: {0}")]
    Precondition(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
