//! Protocol error types.

use thiserror::Error;

/// Errors from encoding, decoding and framing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CBOR serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Bytes are not a valid message envelope or payload.
    #[error("malformed {kind} message: {reason}")]
    Malformed {
        /// Kind tag of the envelope, or `envelope` if it could not be read.
        kind: String,
        /// Decoder diagnostic.
        reason: String,
    },

    /// Envelope carries a kind this version does not know.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// Frame header magic bytes did not match.
    #[error("bad frame magic: {0:02x?}")]
    BadMagic([u8; 2]),

    /// Frame header carries an unsupported version.
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// Payload length exceeds [`crate::MAX_PAYLOAD_SIZE`].
    #[error("frame payload too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Declared or actual payload size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// Not enough bytes for a frame header.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },
}

impl ProtocolError {
    /// Returns true if the stream carrying this frame cannot continue.
    ///
    /// Message-level errors only affect one message. Framing errors leave
    /// the byte stream at an unknown offset.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Encode(_) | Self::Malformed { .. } | Self::UnknownKind(_) => false,
            Self::BadMagic(_)
            | Self::UnsupportedVersion(_)
            | Self::FrameTooLarge { .. }
            | Self::Truncated { .. } => true,
        }
    }
}
