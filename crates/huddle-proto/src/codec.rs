//! CBOR message codec.
//!
//! Messages travel as a two-field CBOR map:
//!
//! ```text
//! { "kind": "participant-left", "payload": { "identifier": "peer-b" } }
//! ```
//!
//! Decoding reads the envelope first and only then the kind-specific payload,
//! so a newer peer sending a kind we do not know yields
//! [`ProtocolError::UnknownKind`] instead of a generic parse failure. Callers
//! log and drop those.

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::ProtocolError,
    message::{Message, MessageKind},
};

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    kind: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    kind: String,
    payload: ciborium::Value,
}

impl Envelope {
    fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        self.payload
            .deserialized()
            .map_err(|e| ProtocolError::Malformed { kind: self.kind.clone(), reason: e.to_string() })
    }
}

/// Encode a message into its wire envelope.
pub fn encode(message: &Message) -> Result<Bytes, ProtocolError> {
    let kind = message.kind().as_str();
    let mut buf = Vec::new();

    match message {
        Message::Chat(payload) => write_envelope(kind, payload, &mut buf)?,
        Message::RosterSnapshot(payload) => write_envelope(kind, payload, &mut buf)?,
        Message::ParticipantJoined(payload) => write_envelope(kind, payload, &mut buf)?,
        Message::ParticipantLeft(payload) => write_envelope(kind, payload, &mut buf)?,
        Message::RoomFull(payload) => write_envelope(kind, payload, &mut buf)?,
    }

    Ok(Bytes::from(buf))
}

/// Decode a wire envelope.
///
/// # Errors
///
/// - [`ProtocolError::UnknownKind`] if the kind tag is not recognized
/// - [`ProtocolError::Malformed`] if the envelope or payload does not parse,
///   or if bytes follow the envelope
pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
    let mut reader = bytes;
    let envelope: Envelope = ciborium::de::from_reader(&mut reader).map_err(|e| {
        ProtocolError::Malformed { kind: "envelope".to_string(), reason: e.to_string() }
    })?;
    if !reader.is_empty() {
        return Err(ProtocolError::Malformed {
            kind: "envelope".to_string(),
            reason: format!("{} trailing bytes", reader.len()),
        });
    }

    let Some(kind) = MessageKind::from_tag(&envelope.kind) else {
        return Err(ProtocolError::UnknownKind(envelope.kind));
    };

    let message = match kind {
        MessageKind::Chat => Message::Chat(envelope.payload()?),
        MessageKind::RosterSnapshot => Message::RosterSnapshot(envelope.payload()?),
        MessageKind::ParticipantJoined => Message::ParticipantJoined(envelope.payload()?),
        MessageKind::ParticipantLeft => Message::ParticipantLeft(envelope.payload()?),
        MessageKind::RoomFull => Message::RoomFull(envelope.payload()?),
    };

    Ok(message)
}

fn write_envelope<T: Serialize>(
    kind: &str,
    payload: &T,
    buf: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    ciborium::ser::into_writer(&EnvelopeRef { kind, payload }, buf)
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}
