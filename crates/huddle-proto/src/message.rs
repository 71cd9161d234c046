//! Message taxonomy.
//!
//! Every message exchanged between participants is one of the variants of
//! [`Message`]. Each variant carries its own payload type, so a malformed
//! payload surfaces as a decode error instead of a runtime guess.
//!
//! | Kind                 | Direction                   | Payload            |
//! |----------------------|-----------------------------|--------------------|
//! | `chat`               | client → host → others      | [`Chat`]           |
//! | `roster-snapshot`    | host → client               | [`RosterSnapshot`] |
//! | `participant-joined` | host → others               | [`Participant`]    |
//! | `participant-left`   | host → others               | [`ParticipantLeft`]|
//! | `room-full`          | host → rejected candidate   | [`RoomFull`]       |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::participant::{Participant, PeerId};

/// Chat text.
///
/// `sender` is whatever the originator claimed. The host overwrites it with
/// the identifier of the link the message arrived on before relaying, so only
/// host-stamped values are authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Message body, relayed verbatim.
    pub text: String,
    /// Originating participant.
    pub sender: PeerId,
}

/// Full roster, replaces the receiver's roster wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    /// Participants in roster order, host first.
    pub participants: Vec<Participant>,
}

/// Incremental removal of a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantLeft {
    /// Identifier of the departed participant.
    pub identifier: PeerId,
}

/// Capacity rejection. Terminal for the join attempt that receives it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomFull {}

/// Closed set of inter-participant messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Chat text.
    Chat(Chat),
    /// Full roster replacement.
    RosterSnapshot(RosterSnapshot),
    /// A participant was admitted.
    ParticipantJoined(Participant),
    /// A participant departed.
    ParticipantLeft(ParticipantLeft),
    /// The room is at capacity.
    RoomFull(RoomFull),
}

impl Message {
    /// Chat message with the given text and claimed sender.
    pub fn chat(text: impl Into<String>, sender: PeerId) -> Self {
        Self::Chat(Chat { text: text.into(), sender })
    }

    /// Snapshot of the given participants.
    pub fn roster_snapshot(participants: Vec<Participant>) -> Self {
        Self::RosterSnapshot(RosterSnapshot { participants })
    }

    /// Departure notice for `identifier`.
    pub fn participant_left(identifier: PeerId) -> Self {
        Self::ParticipantLeft(ParticipantLeft { identifier })
    }

    /// Kind tag of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Chat(_) => MessageKind::Chat,
            Self::RosterSnapshot(_) => MessageKind::RosterSnapshot,
            Self::ParticipantJoined(_) => MessageKind::ParticipantJoined,
            Self::ParticipantLeft(_) => MessageKind::ParticipantLeft,
            Self::RoomFull(_) => MessageKind::RoomFull,
        }
    }
}

/// Kind tags as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `chat`
    Chat,
    /// `roster-snapshot`
    RosterSnapshot,
    /// `participant-joined`
    ParticipantJoined,
    /// `participant-left`
    ParticipantLeft,
    /// `room-full`
    RoomFull,
}

impl MessageKind {
    /// All known kinds.
    pub const ALL: [Self; 5] = [
        Self::Chat,
        Self::RosterSnapshot,
        Self::ParticipantJoined,
        Self::ParticipantLeft,
        Self::RoomFull,
    ];

    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::RosterSnapshot => "roster-snapshot",
            Self::ParticipantJoined => "participant-joined",
            Self::ParticipantLeft => "participant-left",
            Self::RoomFull => "room-full",
        }
    }

    /// Parse a wire tag. `None` for kinds this version does not know.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_parse_back() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_tag(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_tag_is_none() {
        assert_eq!(MessageKind::from_tag("cursor"), None);
        assert_eq!(MessageKind::from_tag(""), None);
    }

    #[test]
    fn message_reports_its_kind() {
        let msg = Message::chat("hi", PeerId::from("a"));
        assert_eq!(msg.kind(), MessageKind::Chat);
        assert_eq!(Message::RoomFull(RoomFull {}).kind(), MessageKind::RoomFull);
    }
}
