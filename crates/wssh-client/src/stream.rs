//! Session stream multiplexing over the transport channel.
//!
//! Once a session is connected, raw session bytes and control messages share
//! one transport channel. Outbound session bytes travel as binary frames, or
//! as `data` control messages when the session uses text framing; window
//! changes travel as `resize` control messages in text frames.
//! Inbound, binary frames are session bytes, and a text frame is decoded as
//! a gateway control message (`data` carries bytes as text, `error` ends the
//! session).

use tracing::{debug, warn};
use wssh_core::{codec, ClientMessage, GatewayMessage, WsshResult};

use crate::config::OutboundFraming;
use crate::transport::TransportMessage;

/// What an inbound transport message means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Session bytes for the caller.
    Data(Vec<u8>),
    /// The gateway reported a failure; the session is over.
    RemoteError(String),
    /// Nothing for the caller (empty chunk, stray control message).
    Ignored,
}

/// Traffic counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub frames_in: u64,
    pub frames_out: u64,
}

/// Frames outbound session traffic and classifies inbound traffic.
#[derive(Debug, Default)]
pub struct SessionStream {
    framing: OutboundFraming,
    stats: StreamStats,
}

impl SessionStream {
    pub fn new(framing: OutboundFraming) -> Self {
        Self {
            framing,
            stats: StreamStats::default(),
        }
    }

    /// Wrap session bytes for the transport.
    pub fn frame(&mut self, data: Vec<u8>) -> WsshResult<TransportMessage> {
        let len = data.len() as u64;
        let message = match self.framing {
            OutboundFraming::Binary => TransportMessage::Binary(data),
            OutboundFraming::Text => {
                let text = match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(e) => {
                        debug!("replacing invalid UTF-8 in text-framed input");
                        String::from_utf8_lossy(e.as_bytes()).into_owned()
                    }
                };
                TransportMessage::Text(codec::encode_client(&ClientMessage::Data(text))?)
            }
        };
        self.stats.bytes_out += len;
        self.stats.frames_out += 1;
        Ok(message)
    }

    /// Build a window-change control message.
    pub fn frame_resize(&mut self, cols: u16, rows: u16) -> WsshResult<TransportMessage> {
        let text = codec::encode_client(&ClientMessage::Resize {
            width: cols,
            height: rows,
        })?;
        self.stats.frames_out += 1;
        Ok(TransportMessage::Text(text))
    }

    /// Classify one inbound transport message.
    pub fn decode(&mut self, message: TransportMessage) -> Inbound {
        self.stats.frames_in += 1;
        let data = match message {
            TransportMessage::Binary(data) => data,
            TransportMessage::Text(text) => match codec::decode_gateway(&text) {
                Ok(GatewayMessage::Data(text)) => text.into_bytes(),
                Ok(GatewayMessage::Error(reason)) => return Inbound::RemoteError(reason),
                Ok(other) => {
                    debug!(?other, "ignoring control message on a connected session");
                    return Inbound::Ignored;
                }
                Err(e) => {
                    warn!("dropping undecodable text frame: {e}");
                    return Inbound::Ignored;
                }
            },
        };

        if data.is_empty() {
            return Inbound::Ignored;
        }
        self.stats.bytes_in += data.len() as u64;
        Inbound::Data(data)
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_bytes_are_binary_frames() {
        let mut stream = SessionStream::new(OutboundFraming::Binary);
        assert_eq!(
            stream.frame(b"ls -la\n".to_vec()).unwrap(),
            TransportMessage::Binary(b"ls -la\n".to_vec())
        );
        assert_eq!(stream.stats().bytes_out, 7);
        assert_eq!(stream.stats().frames_out, 1);
    }

    #[test]
    fn text_framing_sends_data_messages() {
        let mut stream = SessionStream::new(OutboundFraming::Text);
        let TransportMessage::Text(text) = stream.frame(b"ls -la\n".to_vec()).unwrap() else {
            panic!("text framing must produce a text frame");
        };
        assert_eq!(
            codec::decode_client(&text).unwrap(),
            ClientMessage::Data("ls -la\n".into())
        );
        assert_eq!(stream.stats().bytes_out, 7);

        let TransportMessage::Text(text) = stream.frame(vec![b'a', 0xff]).unwrap() else {
            panic!("text framing must produce a text frame");
        };
        assert_eq!(
            codec::decode_client(&text).unwrap(),
            ClientMessage::Data("a\u{fffd}".into())
        );
    }

    #[test]
    fn resize_is_a_control_message() {
        let mut stream = SessionStream::default();
        let TransportMessage::Text(text) = stream.frame_resize(120, 40).unwrap() else {
            panic!("resize must be a text frame");
        };
        assert_eq!(
            codec::decode_client(&text).unwrap(),
            ClientMessage::Resize {
                width: 120,
                height: 40
            }
        );
    }

    #[test]
    fn inbound_binary_and_text_data_are_session_bytes() {
        let mut stream = SessionStream::default();
        assert_eq!(
            stream.decode(TransportMessage::Binary(vec![0x1b, b'[', b'H'])),
            Inbound::Data(vec![0x1b, b'[', b'H'])
        );
        assert_eq!(
            stream.decode(TransportMessage::Text(r#"{"data": "total 0\r\n"}"#.into())),
            Inbound::Data(b"total 0\r\n".to_vec())
        );
        assert_eq!(stream.stats().bytes_in, 12);
        assert_eq!(stream.stats().frames_in, 2);
    }

    #[test]
    fn gateway_error_ends_the_session() {
        let mut stream = SessionStream::default();
        assert_eq!(
            stream.decode(TransportMessage::Text(r#"{"error": "channel closed"}"#.into())),
            Inbound::RemoteError("channel closed".into())
        );
    }

    #[test]
    fn noise_is_ignored() {
        let mut stream = SessionStream::default();
        assert_eq!(stream.decode(TransportMessage::Binary(Vec::new())), Inbound::Ignored);
        assert_eq!(
            stream.decode(TransportMessage::Text(r#"{"data": ""}"#.into())),
            Inbound::Ignored
        );
        assert_eq!(
            stream.decode(TransportMessage::Text("not json".into())),
            Inbound::Ignored
        );
        assert_eq!(
            stream.decode(TransportMessage::Text(r#"{"auth_ok": {}}"#.into())),
            Inbound::Ignored
        );
        assert_eq!(stream.stats().bytes_in, 0);
    }
}
