//! Fuzz target for frame headers and message decoding
//!
//! Every byte that reaches a link is attacker-controlled.
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary header and payload bytes
//! - Envelopes: well-formed CBOR maps with fuzzed kind tags and payloads
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - A parsed header re-encodes to the bytes it was parsed from
//! - A parsed header never declares more than `MAX_PAYLOAD_SIZE`
//! - A decoded message re-encodes and decodes to itself

#![no_main]

use arbitrary::Arbitrary;
use huddle_proto::{FrameHeader, MAX_PAYLOAD_SIZE, decode, encode};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum FuzzInput {
    Raw(Vec<u8>),
    Envelope { kind: String, payload: Vec<u8> },
    Known { kind: u8, payload: Vec<u8> },
}

const KINDS: [&str; 5] =
    ["chat", "roster-snapshot", "participant-joined", "participant-left", "room-full"];

fuzz_target!(|input: FuzzInput| {
    let bytes = match input {
        FuzzInput::Raw(bytes) => bytes,
        FuzzInput::Envelope { kind, payload } => envelope(&kind, &payload),
        FuzzInput::Known { kind, payload } => {
            envelope(KINDS[usize::from(kind) % KINDS.len()], &payload)
        },
    };

    if let Ok(header) = FrameHeader::from_bytes(&bytes) {
        assert!(header.payload_size() <= MAX_PAYLOAD_SIZE);
        assert_eq!(&header.to_bytes()[..], &bytes[..FrameHeader::SIZE]);
    }

    if let Ok(message) = decode(&bytes) {
        let encoded = encode(&message).expect("decoded message must re-encode");
        let decoded = decode(&encoded).expect("re-encoded message must decode");
        assert_eq!(decoded, message);
    }
});

/// CBOR map `{ "kind": <text>, "payload": ... }` with raw fuzz bytes as the payload item.
fn envelope(kind: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xa2];
    text(&mut out, "kind");
    text(&mut out, kind);
    text(&mut out, "payload");
    out.extend_from_slice(payload);
    out
}

fn text(out: &mut Vec<u8>, value: &str) {
    let len = value.len().min(u16::MAX as usize);
    if len < 24 {
        out.push(0x60 | len as u8);
    } else if len < 256 {
        out.extend_from_slice(&[0x78, len as u8]);
    } else {
        out.push(0x79);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
    out.extend_from_slice(&value.as_bytes()[..len]);
}
