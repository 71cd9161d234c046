//! Per-link IO tasks.
//!
//! Every open link gets a reader task that turns frames into node inputs and
//! a writer task that drains an unbounded queue, so writes to one link keep
//! their order and never block the node loop or any other link.

use bytes::Bytes;
use huddle_core::Environment;
use huddle_proto::{FrameFlags, PeerId, frame::encode_frame};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};

use crate::{
    error::LinkError,
    executor::BroadcastPolicy,
    framing::{read_frame, write_resumable},
};

/// Generation number distinguishing successive links to the same peer.
pub type LinkId = u64;

/// What a link task reports back to the node.
#[derive(Debug)]
pub enum LinkInput {
    /// An encoded message arrived.
    Frame {
        /// Remote end.
        peer: PeerId,
        /// Link generation.
        link: LinkId,
        /// Encoded message.
        payload: Bytes,
    },
    /// Read or write failure.
    Failed {
        /// Remote end.
        peer: PeerId,
        /// Link generation.
        link: LinkId,
        /// Error kind.
        kind: String,
        /// Diagnostic text.
        text: String,
    },
    /// The remote end closed the stream.
    Closed {
        /// Remote end.
        peer: PeerId,
        /// Link generation.
        link: LinkId,
    },
}

/// Node-side handle to a running link.
#[derive(Debug)]
pub struct LinkHandle {
    id: LinkId,
    writer: mpsc::UnboundedSender<Bytes>,
    reader: JoinHandle<()>,
}

impl LinkHandle {
    /// Start the reader and writer tasks for `stream`.
    pub fn spawn<S, E>(
        peer: PeerId,
        id: LinkId,
        stream: S,
        inputs: mpsc::UnboundedSender<LinkInput>,
        policy: BroadcastPolicy,
        env: E,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        E: Environment,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, queue) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(write_half, queue, peer.clone(), id, inputs.clone(), policy, env));
        let reader = tokio::spawn(read_loop(read_half, peer, id, inputs));

        Self { id, writer, reader }
    }

    /// Link generation.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Queue an encoded message. Returns false if the writer is gone.
    pub fn send(&self, payload: Bytes) -> bool {
        self.writer.send(payload).is_ok()
    }

    /// Stop reading and let the writer flush what is queued, then shut the
    /// stream down.
    pub fn close(self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(
    mut reader: R,
    peer: PeerId,
    link: LinkId,
    inputs: mpsc::UnboundedSender<LinkInput>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(Some((flags, payload))) => {
                if flags.contains(FrameFlags::HANDSHAKE) {
                    tracing::debug!("ignoring repeated handshake from {peer}");
                    continue;
                }
                if inputs.send(LinkInput::Frame { peer: peer.clone(), link, payload }).is_err() {
                    return;
                }
            },
            Ok(None) => break,
            Err(e) => {
                let _ = inputs.send(failed(&peer, link, &e));
                break;
            },
        }
    }

    let _ = inputs.send(LinkInput::Closed { peer, link });
}

async fn write_loop<W, E>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    peer: PeerId,
    link: LinkId,
    inputs: mpsc::UnboundedSender<LinkInput>,
    policy: BroadcastPolicy,
    env: E,
) where
    W: AsyncWrite + Unpin,
    E: Environment,
{
    while let Some(payload) = queue.recv().await {
        let frame = match encode_frame(FrameFlags::empty(), &payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("frame to {peer} dropped: {e}");
                continue;
            },
        };

        // Retries resume at `written`; resending a prefix would corrupt framing.
        let mut written = 0;
        let mut attempt = 0;
        while let Err(e) = write_resumable(&mut writer, &frame, &mut written).await {
            let Some(delay) = policy.retry_delay(attempt) else {
                tracing::warn!("write to {peer} failed: {e}");
                let _ = inputs.send(failed(&peer, link, &e));
                return;
            };
            tracing::debug!(
                "write to {peer} failed at byte {written}/{}, retrying in {delay:?}: {e}",
                frame.len()
            );
            attempt += 1;
            env.sleep(delay).await;
        }
    }

    let _ = writer.shutdown().await;
}

fn failed(peer: &PeerId, link: LinkId, error: &LinkError) -> LinkInput {
    LinkInput::Failed {
        peer: peer.clone(),
        link,
        kind: error.kind().to_string(),
        text: error.to_string(),
    }
}
