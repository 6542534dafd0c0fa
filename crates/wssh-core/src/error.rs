use thiserror::Error;

/// Errors produced by the wssh protocol layer.
#[derive(Debug, Error)]
pub enum WsshError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("private key is encrypted and no passphrase was provided")]
    PassphraseRequired,

    #[error("failed to decrypt private key: {0}")]
    KeyDecryption(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for WsshError {
    fn from(e: serde_json::Error) -> Self {
        WsshError::Codec(e.to_string())
    }
}

pub type WsshResult<T> = Result<T, WsshError>;
