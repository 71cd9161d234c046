//! Frame IO over async byte streams.
//!
//! Shared by every directory implementation and by the link tasks. A stream
//! carries exactly one handshake frame from the opener, then message frames
//! in both directions.

use bytes::Bytes;
use huddle_proto::{FrameFlags, FrameHeader, PeerId, frame::encode_frame};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::LinkError;

/// Read one frame. Returns `None` on a clean end of stream between frames.
///
/// A stream that ends partway through a header or payload is an
/// [`std::io::ErrorKind::UnexpectedEof`] error, not a close.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<(FrameFlags, Bytes)>, LinkError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; FrameHeader::SIZE];
    let mut filled = 0;
    while filled < head.len() {
        let n = reader.read(&mut head[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream ended {filled} bytes into a frame header"),
            )));
        }
        filled += n;
    }

    let header = FrameHeader::from_bytes(&head)?;
    let mut payload = vec![0u8; header.payload_size()];
    reader.read_exact(&mut payload).await?;

    Ok(Some((header.flags(), Bytes::from(payload))))
}

/// Write one message frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), LinkError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(FrameFlags::empty(), payload)?;
    let mut written = 0;
    write_resumable(writer, &frame, &mut written).await
}

/// Write `frame[*written..]`, advancing `written` as the stream accepts
/// bytes. After an error, calling again with the same offset continues the
/// frame where it stopped instead of repeating bytes already on the wire.
pub async fn write_resumable<W>(
    writer: &mut W,
    frame: &[u8],
    written: &mut usize,
) -> Result<(), LinkError>
where
    W: AsyncWrite + Unpin,
{
    while *written < frame.len() {
        let n = writer.write(&frame[*written..]).await?;
        if n == 0 {
            return Err(LinkError::Io(std::io::ErrorKind::WriteZero.into()));
        }
        *written += n;
    }
    writer.flush().await?;
    Ok(())
}

/// Identify ourselves as the opener of a fresh stream.
pub async fn write_handshake<W>(writer: &mut W, local_id: &PeerId) -> Result<(), LinkError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(FrameFlags::HANDSHAKE, local_id.as_str().as_bytes())?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the opener's identifier from a freshly accepted stream.
pub async fn read_handshake<R>(reader: &mut R) -> Result<PeerId, LinkError>
where
    R: AsyncRead + Unpin,
{
    let Some((flags, payload)) = read_frame(reader).await? else {
        return Err(LinkError::Handshake("stream closed before handshake".into()));
    };
    if !flags.contains(FrameFlags::HANDSHAKE) {
        return Err(LinkError::Handshake("first frame is not a handshake".into()));
    }

    let id = std::str::from_utf8(&payload)
        .map_err(|_| LinkError::Handshake("identifier is not utf-8".into()))?;
    if id.is_empty() {
        return Err(LinkError::Handshake("empty identifier".into()));
    }
    Ok(PeerId::from(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handshake_then_frames() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        write_handshake(&mut a, &PeerId::from("10.0.0.1:7000")).await.unwrap();
        write_frame(&mut a, b"one").await.unwrap();
        write_frame(&mut a, b"two").await.unwrap();
        drop(a);

        assert_eq!(read_handshake(&mut b).await.unwrap(), PeerId::from("10.0.0.1:7000"));
        let (_, first) = read_frame(&mut b).await.unwrap().unwrap();
        let (_, second) = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!((&first[..], &second[..]), (&b"one"[..], &b"two"[..]));
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn message_frame_is_not_a_handshake() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"hello").await.unwrap();

        let err = read_handshake(&mut b).await.unwrap_err();
        assert_eq!(err.kind(), "handshake");
    }

    #[tokio::test]
    async fn eof_inside_header_is_an_error() {
        let mut stream: &[u8] = &[b'H', b'D', 1];

        let err = read_frame(&mut stream).await.unwrap_err();
        assert_eq!(err.kind(), "io");
        assert!(matches!(err, LinkError::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn eof_inside_payload_is_an_error() {
        let frame = encode_frame(FrameFlags::empty(), b"hello").unwrap();
        let mut stream = &frame[..frame.len() - 2];

        let err = read_frame(&mut stream).await.unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[tokio::test]
    async fn eof_between_frames_is_a_close() {
        let mut stream: &[u8] = &[];
        assert!(read_frame(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_is_a_protocol_error() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(b"GARBAGE!").await.unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }
}
