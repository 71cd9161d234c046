//! Huddle Protocol
//!
//! Wire-level types shared by every participant in a room: identifiers,
//! participants, the closed message taxonomy and the byte framing used on
//! point-to-point links.
//!
//! # Layers
//!
//! - [`Message`]: one variant per message kind, each with a concrete payload
//! - [`codec`]: CBOR envelope `{ kind, payload }`, forward-compatible with
//!   unknown kinds
//! - [`FrameHeader`]: fixed 8-byte header that delimits encoded messages on a
//!   byte stream
//!
//! This crate performs no IO.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod participant;

pub use codec::{decode, encode};
pub use error::ProtocolError;
pub use frame::{FrameFlags, FrameHeader, MAX_PAYLOAD_SIZE};
pub use message::{Chat, Message, MessageKind, ParticipantLeft, RoomFull, RosterSnapshot};
pub use participant::{Participant, PeerId, Role};
