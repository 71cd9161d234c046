//! Directory abstraction.
//!
//! The directory assigns the local identifier and turns identifiers into
//! byte streams. Everything above it only ever sees identifiers.

use async_trait::async_trait;
use huddle_proto::PeerId;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::DirectoryError;

/// Identifier assignment plus point-to-point link establishment.
///
/// All methods take `&self`: the node calls `accept` from a background task
/// while `open_link` and `connect` run concurrently.
#[async_trait]
pub trait Directory: Send + Sync + 'static {
    /// Byte stream underlying one link.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Register with the directory and return the assigned identifier.
    ///
    /// `preferred` is the identifier held before a disconnection. The
    /// directory keeps it when it can and assigns a new one otherwise.
    async fn connect(&self, preferred: Option<&PeerId>) -> Result<PeerId, DirectoryError>;

    /// Wait for the next inbound link and identify its opener.
    ///
    /// An error means the directory connection itself is lost.
    async fn accept(&self) -> Result<(PeerId, Self::Stream), DirectoryError>;

    /// Open a link to `peer`.
    async fn open_link(&self, peer: &PeerId) -> Result<Self::Stream, DirectoryError>;
}
