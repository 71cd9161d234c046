//! Operations for model-based testing.
//!
//! Operations are generated randomly by proptest (or decoded from fuzz
//! input through `Arbitrary`) and applied to both the model and the real
//! sessions.

use arbitrary::Arbitrary;

/// Participant index (0-based).
pub type ClientId = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Participant creates a room and hosts it.
    CreateRoom {
        /// Participant performing the operation.
        client_id: ClientId,
    },

    /// Participant joins the room hosted by another participant.
    JoinRoom {
        /// Joining participant.
        client_id: ClientId,
        /// Participant whose identifier is used as the join code.
        host_id: ClientId,
    },

    /// Participant leaves its room.
    LeaveRoom {
        /// Leaving participant.
        client_id: ClientId,
    },

    /// Participant sends chat to its room.
    SendChat {
        /// Sending participant.
        client_id: ClientId,
        /// Chat content.
        content: SmallMessage,
    },

    /// Participant loses and regains its directory connection.
    ///
    /// Links are unaffected, so nothing observable changes.
    BounceDirectory {
        /// Affected participant.
        client_id: ClientId,
    },

    /// Advance simulation time and tick every participant.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

impl Operation {
    /// Map every participant index into `0..num_clients`.
    pub fn clamped(self, num_clients: usize) -> Self {
        let n = u8::try_from(num_clients.clamp(1, usize::from(u8::MAX))).unwrap_or(u8::MAX);
        match self {
            Self::CreateRoom { client_id } => Self::CreateRoom { client_id: client_id % n },
            Self::JoinRoom { client_id, host_id } => {
                Self::JoinRoom { client_id: client_id % n, host_id: host_id % n }
            },
            Self::LeaveRoom { client_id } => Self::LeaveRoom { client_id: client_id % n },
            Self::SendChat { client_id, content } => {
                Self::SendChat { client_id: client_id % n, content }
            },
            Self::BounceDirectory { client_id } => {
                Self::BounceDirectory { client_id: client_id % n }
            },
            Self::AdvanceTime { millis } => Self::AdvanceTime { millis },
        }
    }
}

/// Compact chat content.
///
/// Keeps generated cases small while still exercising empty, short and long
/// texts. The text is derived deterministically from the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallMessage {
    /// Content seed.
    pub seed: u8,
    /// Length hint (0-3 maps to empty/short/medium/long).
    pub size_class: u8,
}

impl SmallMessage {
    /// Expand to chat text.
    pub fn to_text(self) -> String {
        let len: u8 = match self.size_class % 4 {
            0 => 0,
            1 => 8,
            2 => 64,
            _ => 200,
        };

        (0..len).map(|i| char::from(b'a' + self.seed.wrapping_add(i) % 26)).collect()
    }
}

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// The intent was accepted.
    Ok,
    /// The intent was refused.
    Error(OperationError),
}

impl OperationResult {
    /// Check if the operation was accepted.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if the operation was refused.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

/// Reasons an intent is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Participant index out of range.
    InvalidClient,
    /// Intent does not apply in the participant's current state.
    InvalidState,
}
