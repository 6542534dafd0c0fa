//! JSON codec for the gateway control channel.
//!
//! Wire format: one JSON object per WebSocket text frame.

use crate::error::{WsshError, WsshResult};
use crate::messages::{ClientMessage, GatewayMessage};

/// Encode a client message into the text of a single frame.
pub fn encode_client(message: &ClientMessage) -> WsshResult<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode the text of a frame received from the gateway.
pub fn decode_gateway(text: &str) -> WsshResult<GatewayMessage> {
    decode(text)
}

/// Encode a gateway message. Used by gateways and test doubles.
pub fn encode_gateway(message: &GatewayMessage) -> WsshResult<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode the text of a frame sent by a client.
pub fn decode_client(text: &str) -> WsshResult<ClientMessage> {
    decode(text)
}

fn decode<T: serde::de::DeserializeOwned>(text: &str) -> WsshResult<T> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(WsshError::InvalidMessage("empty control frame".into()));
    }
    Ok(serde_json::from_str(trimmed)?)
}
