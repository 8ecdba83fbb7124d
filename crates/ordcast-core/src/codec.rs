//! CBOR encoding of messages for the wire.
//!
//! Only the body is produced here. Framing (length prefix) is the transport's
//! job, so a frame body always holds exactly one [`WireMessage`].

use std::io::Cursor;

use crate::error::{CoreError, Result};
use crate::message::{Message, WireMessage};

/// Encode a message's wire fields to CBOR bytes.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    let wire = WireMessage::from(message);
    let mut buf = Vec::with_capacity(64);
    ciborium::into_writer(&wire, &mut buf).map_err(|e| CoreError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Decode a frame body into a message with a zero ack count.
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let cursor = Cursor::new(bytes);
    let wire: WireMessage =
        ciborium::from_reader(cursor).map_err(|e| CoreError::Decoding(e.to_string()))?;
    Message::try_from(wire)
}
