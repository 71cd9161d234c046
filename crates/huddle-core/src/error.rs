//! Session error types.

use huddle_proto::{MessageKind, PeerId};
use thiserror::Error;

use crate::event_log::LogLevel;

/// Errors surfaced by the session.
///
/// Transport-level variants are never returned from
/// [`Session::handle`](crate::Session::handle); the session records them in
/// its event log and translates them into state transitions. Only invalid
/// local intents come back as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The directory cannot be reached or rejected us. Fatal.
    #[error("directory unavailable: {reason}")]
    DirectoryUnavailable {
        /// Directory diagnostic.
        reason: String,
    },

    /// The join code does not name a registered peer.
    #[error("peer unreachable: {peer}")]
    PeerUnreachable {
        /// Identifier that could not be reached.
        peer: PeerId,
    },

    /// The host refused the join attempt because the room is at capacity.
    #[error("room full: {host} rejected the join")]
    RoomFull {
        /// Host that sent the rejection.
        host: PeerId,
    },

    /// A single link reported an error. It is expected to close next.
    #[error("link error on {peer}: {kind}: {text}")]
    LinkError {
        /// Remote end of the link.
        peer: PeerId,
        /// Error kind reported by the transport.
        kind: String,
        /// Transport diagnostic.
        text: String,
    },

    /// A peer sent a message kind this version does not know.
    #[error("unknown message kind {kind:?} from {from}")]
    UnknownMessageKind {
        /// Sender link.
        from: PeerId,
        /// Unrecognized kind tag.
        kind: String,
    },

    /// A peer sent bytes that do not decode as a message.
    #[error("malformed message from {from}: {reason}")]
    MalformedMessage {
        /// Sender link.
        from: PeerId,
        /// Decoder diagnostic.
        reason: String,
    },

    /// A known message kind arrived where the protocol does not allow it.
    #[error("unexpected {kind} from {from}")]
    UnexpectedMessage {
        /// Sender link.
        from: PeerId,
        /// Kind that was dropped.
        kind: MessageKind,
    },

    /// An encoded message would not fit in one frame.
    #[error("{kind} of {size} bytes exceeds the {max}-byte frame limit")]
    MessageTooLarge {
        /// Kind of the oversize message.
        kind: MessageKind,
        /// Encoded size.
        size: usize,
        /// Frame payload limit.
        max: usize,
    },

    /// The local intent is not valid in the current state.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Description of the state conflict.
        reason: String,
    },

    /// The session hit a fatal error earlier and accepts no further intents.
    #[error("session is in error state, restart required")]
    Errored,
}

impl SessionError {
    /// Returns true if this error ends the session.
    ///
    /// Only directory failures are fatal. Everything else fails one join
    /// attempt, one link, or one message.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DirectoryUnavailable { .. } | Self::Errored => true,

            Self::PeerUnreachable { .. }
            | Self::RoomFull { .. }
            | Self::LinkError { .. }
            | Self::UnknownMessageKind { .. }
            | Self::MalformedMessage { .. }
            | Self::UnexpectedMessage { .. }
            | Self::MessageTooLarge { .. }
            | Self::InvalidState { .. } => false,
        }
    }

    /// Severity used when this error is recorded in the event log.
    pub fn severity(&self) -> LogLevel {
        match self {
            Self::DirectoryUnavailable { .. } | Self::Errored => LogLevel::Error,
            Self::PeerUnreachable { .. }
            | Self::RoomFull { .. }
            | Self::LinkError { .. }
            | Self::UnknownMessageKind { .. }
            | Self::MalformedMessage { .. }
            | Self::UnexpectedMessage { .. }
            | Self::MessageTooLarge { .. }
            | Self::InvalidState { .. } => LogLevel::Warn,
        }
    }
}
