//! Session events and actions.
//!
//! Events flow into [`Session::handle`](crate::Session::handle), actions flow
//! out. The driver is responsible for turning actions into IO and IO back into
//! events. Nothing in between blocks.

use std::fmt;

use bytes::Bytes;
use huddle_proto::{Message, Participant, PeerId, Role};

use crate::event_log::LogLevel;

/// Lifecycle state of the local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Not started.
    Uninitialized,
    /// Waiting for the directory to assign an identifier.
    DirectoryConnecting,
    /// Directory connected, not in a room.
    Lobby,
    /// Link to `host` requested, not yet open. Still counts as lobby for the
    /// purposes of the directory.
    Joining {
        /// Identifier being joined.
        host: PeerId,
    },
    /// In a room as its host.
    Hosting,
    /// In a room as a client of `host`.
    Joined {
        /// The room's host.
        host: PeerId,
    },
    /// Unrecoverable directory failure. Terminal.
    Errored {
        /// Failure description.
        reason: String,
    },
}

impl SessionState {
    /// Role held in the current room, if any.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Hosting => Some(Role::Host),
            Self::Joined { .. } => Some(Role::Client),
            _ => None,
        }
    }

    /// True while hosting or joined.
    pub fn in_room(&self) -> bool {
        self.role().is_some()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::DirectoryConnecting => f.write_str("connecting to directory"),
            Self::Lobby => f.write_str("lobby"),
            Self::Joining { host } => write!(f, "joining {host}"),
            Self::Hosting => f.write_str("hosting"),
            Self::Joined { host } => write!(f, "joined {host}"),
            Self::Errored { reason } => write!(f, "errored: {reason}"),
        }
    }
}

/// Directory failure kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryFailure {
    /// The remote identifier is not registered. Fails only the join attempt
    /// targeting it.
    PeerUnavailable {
        /// Identifier that could not be reached.
        peer: PeerId,
    },
    /// Anything else. Errors the session.
    Fatal {
        /// Directory diagnostic.
        reason: String,
    },
}

/// Inputs to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Process startup.
    Start,

    /// The directory assigned (or re-assigned) an identifier.
    DirectoryConnected {
        /// Local identifier.
        local_id: PeerId,
    },

    /// The directory connection dropped. Open links are unaffected.
    DirectoryDisconnected,

    /// The directory reported an error.
    DirectoryFailed(DirectoryFailure),

    /// A remote endpoint is opening a link to us.
    IncomingLink {
        /// Remote identifier.
        peer: PeerId,
    },

    /// A link reached the open state.
    LinkOpened {
        /// Remote identifier.
        peer: PeerId,
    },

    /// A link closed, from either end.
    LinkClosed {
        /// Remote identifier.
        peer: PeerId,
    },

    /// A link reported an error. A close normally follows.
    LinkFailed {
        /// Remote identifier.
        peer: PeerId,
        /// Error kind.
        kind: String,
        /// Diagnostic text.
        text: String,
    },

    /// An encoded message arrived on a link.
    FrameReceived {
        /// Remote identifier.
        from: PeerId,
        /// Encoded message.
        payload: Bytes,
    },

    /// Timer wakeup. Processes expired deadlines.
    Tick,

    /// Local intent: create a room and host it.
    CreateRoom,

    /// Local intent: join the room hosted by `code`.
    JoinRoom {
        /// Host identifier, as decoded from the join code.
        code: PeerId,
    },

    /// Local intent: leave the current room.
    LeaveRoom,

    /// Local intent: send chat text to the room.
    SendChat {
        /// Chat body.
        text: String,
    },
}

/// Outputs of the session, executed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Connect (or reconnect) to the directory.
    ConnectDirectory {
        /// Identifier to ask for again after a disconnection.
        preferred: Option<PeerId>,
    },

    /// Open a link to `peer`.
    OpenLink {
        /// Remote identifier.
        peer: PeerId,
    },

    /// Send one message on the link to `to`.
    ///
    /// Fire-and-forget: a failure affects only this send.
    Send {
        /// Remote identifier.
        to: PeerId,
        /// Message to encode and send.
        message: Message,
    },

    /// Close the link to `peer`. No `LinkClosed` event is expected back.
    CloseLink {
        /// Remote identifier.
        peer: PeerId,
    },

    /// The local roster changed.
    RosterChanged {
        /// Full roster after the change. Empty when the room ended.
        roster: Vec<Participant>,
    },

    /// Chat to show locally.
    DeliverChat {
        /// Authoritative sender.
        sender: PeerId,
        /// Chat body.
        text: String,
    },

    /// The session state changed.
    StateChanged {
        /// New state.
        state: SessionState,
    },

    /// Log line for the driver's logging sink.
    Log {
        /// Severity.
        level: LogLevel,
        /// Log message.
        message: String,
    },
}
