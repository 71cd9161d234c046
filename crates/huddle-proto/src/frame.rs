//! Link framing.
//!
//! A link is a reliable ordered byte stream. Encoded messages are delimited
//! on it by a fixed 8-byte header:
//!
//! ```text
//! [magic: "HD"] [version: u8] [flags: u8] [payload_len: u32 BE] [payload]
//! ```

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U32},
};

use crate::error::ProtocolError;

/// Frame magic bytes.
pub const MAGIC: [u8; 2] = *b"HD";

/// Current framing version.
pub const VERSION: u8 = 1;

/// Largest accepted payload (64 KiB).
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

bitflags::bitflags! {
    /// Per-frame flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u8 {
        /// Link-open handshake carrying the opener's identifier. Consumed by
        /// the directory, never surfaced as a room message.
        const HANDSHAKE = 0b0000_0001;
    }
}

/// Fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    magic: [u8; 2],
    version: u8,
    flags: u8,
    payload_len: U32<BigEndian>,
}

impl FrameHeader {
    /// Encoded header size in bytes.
    pub const SIZE: usize = 8;

    /// Header for a payload of `payload_len` bytes.
    pub fn new(flags: FrameFlags, payload_len: usize) -> Result<Self, ProtocolError> {
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: payload_len, max: MAX_PAYLOAD_SIZE });
        }

        #[allow(clippy::cast_possible_truncation)]
        let payload_len = U32::new(payload_len as u32);

        Ok(Self { magic: MAGIC, version: VERSION, flags: flags.bits(), payload_len })
    }

    /// Parse and validate a header from the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Some(head) = bytes.get(..Self::SIZE) else {
            return Err(ProtocolError::Truncated { needed: Self::SIZE, available: bytes.len() });
        };

        let header = Self::read_from_bytes(head).map_err(|_| ProtocolError::Truncated {
            needed: Self::SIZE,
            available: bytes.len(),
        })?;

        if header.magic != MAGIC {
            return Err(ProtocolError::BadMagic(header.magic));
        }
        if header.version != VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }
        if header.payload_size() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: header.payload_size(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(header)
    }

    /// Declared payload length.
    pub fn payload_size(&self) -> usize {
        self.payload_len.get() as usize
    }

    /// Frame flags. Unknown bits are dropped.
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_bits_truncate(self.flags)
    }

    /// Header bytes as sent on the wire.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

/// Header followed by payload, ready to write to a stream.
pub fn encode_frame(flags: FrameFlags, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let header = FrameHeader::new(flags, payload.len())?;

    let mut buf = Vec::with_capacity(FrameHeader::SIZE + payload.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}
