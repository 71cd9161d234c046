//! Node error types.

use huddle_core::SessionError;
use huddle_proto::{PeerId, ProtocolError};
use thiserror::Error;

/// Errors reported by a [`Directory`](crate::Directory).
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory cannot be reached or refused us.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The remote identifier is not registered with the directory.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(PeerId),

    /// IO failure on an established directory connection.
    #[error("directory io: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors on a single link's byte stream.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Transport failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The stream carried bytes that are not a valid frame.
    #[error("framing: {0}")]
    Protocol(#[from] ProtocolError),

    /// The opener did not identify itself.
    #[error("handshake: {0}")]
    Handshake(String),
}

impl LinkError {
    /// Short kind tag reported to the session.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Protocol(_) => "protocol",
            Self::Handshake(_) => "handshake",
        }
    }
}

/// Errors that stop a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Directory error
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// IO error outside a link
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Session rejected a command
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The node task is gone
    #[error("node stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_error_kinds() {
        let io = LinkError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert_eq!(io.kind(), "io");

        let framing = LinkError::from(ProtocolError::BadMagic(*b"XX"));
        assert_eq!(framing.kind(), "protocol");
    }

    #[test]
    fn directory_error_display() {
        let err = DirectoryError::PeerUnreachable(PeerId::from("127.0.0.1:9"));
        assert_eq!(err.to_string(), "peer unreachable: 127.0.0.1:9");
    }
}
