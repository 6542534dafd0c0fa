//! wssh-core: Shared protocol library for wssh (SSH over WebSocket).
//!
//! Provides the JSON control messages exchanged with a WebSocket-to-SSH
//! gateway, the codec for those messages, OpenSSH private key handling,
//! and the public-key authentication transcript.

pub mod auth;
pub mod codec;
pub mod error;
pub mod keys;
pub mod messages;

// Re-export commonly used items at crate root.
pub use error::{WsshError, WsshResult};
pub use messages::{AuthCredential, AuthRequest, ClientMessage, GatewayMessage, PROTOCOL_VERSION};
pub use codec::{decode_client, decode_gateway, encode_client, encode_gateway};
pub use keys::{decode_private_key, fingerprint};
