//! TCP directory.
//!
//! The identifier of a node is its listen address, so a join code is just
//! `ip:port`. Opening a link is a TCP connect followed by a handshake frame
//! that tells the acceptor who is calling.

use std::{
    io::ErrorKind,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use huddle_proto::PeerId;
use tokio::net::{TcpListener, TcpStream};

use crate::{
    directory::Directory,
    error::DirectoryError,
    framing::{read_handshake, write_handshake},
};

/// Time an accepted stream gets to identify itself.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Registration {
    listener: Option<Arc<TcpListener>>,
    local_id: Option<PeerId>,
}

/// Directory over plain TCP listeners.
#[derive(Debug)]
pub struct TcpDirectory {
    bind: SocketAddr,
    registration: Mutex<Registration>,
}

impl TcpDirectory {
    /// Directory that listens on `bind`. Port 0 picks a free port.
    pub fn new(bind: SocketAddr) -> Self {
        Self { bind, registration: Mutex::new(Registration::default()) }
    }

    /// Parse `bind` and build a directory.
    pub fn parse(bind: &str) -> Result<Self, DirectoryError> {
        let addr = bind.parse::<SocketAddr>().map_err(|e| {
            DirectoryError::Unavailable(format!("invalid bind address {bind:?}: {e}"))
        })?;
        Ok(Self::new(addr))
    }

    /// Currently assigned identifier.
    pub fn local_id(&self) -> Option<PeerId> {
        self.registration.lock().ok().and_then(|r| r.local_id.clone())
    }

    fn listener(&self) -> Result<Arc<TcpListener>, DirectoryError> {
        self.registration
            .lock()
            .ok()
            .and_then(|r| r.listener.clone())
            .ok_or_else(|| DirectoryError::Unavailable("not connected".into()))
    }

    async fn bind_preferred(
        &self,
        preferred: Option<&PeerId>,
    ) -> Result<TcpListener, DirectoryError> {
        // Release the previous listener so its address can be taken again.
        if let Ok(mut registration) = self.registration.lock() {
            registration.listener = None;
        }

        if let Some(addr) = preferred.and_then(|id| id.as_str().parse::<SocketAddr>().ok()) {
            match TcpListener::bind(addr).await {
                Ok(listener) => return Ok(listener),
                Err(e) => tracing::warn!("cannot rebind {addr}: {e}, taking a new address"),
            }
        }

        TcpListener::bind(self.bind)
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("bind {}: {e}", self.bind)))
    }
}

#[async_trait]
impl Directory for TcpDirectory {
    type Stream = TcpStream;

    async fn connect(&self, preferred: Option<&PeerId>) -> Result<PeerId, DirectoryError> {
        let listener = self.bind_preferred(preferred).await?;
        let local_id = PeerId::new(listener.local_addr()?.to_string());

        let mut registration = self
            .registration
            .lock()
            .map_err(|_| DirectoryError::Unavailable("registration poisoned".into()))?;
        registration.listener = Some(Arc::new(listener));
        registration.local_id = Some(local_id.clone());

        tracing::debug!("tcp directory listening as {local_id}");
        Ok(local_id)
    }

    async fn accept(&self) -> Result<(PeerId, Self::Stream), DirectoryError> {
        let listener = self.listener()?;

        loop {
            let (mut stream, addr) = listener.accept().await?;

            match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_handshake(&mut stream)).await {
                Ok(Ok(peer)) => return Ok((peer, stream)),
                Ok(Err(e)) => tracing::debug!("dropping connection from {addr}: {e}"),
                Err(_) => tracing::debug!("dropping connection from {addr}: handshake timed out"),
            }
        }
    }

    async fn open_link(&self, peer: &PeerId) -> Result<Self::Stream, DirectoryError> {
        let local_id = self
            .local_id()
            .ok_or_else(|| DirectoryError::Unavailable("not connected".into()))?;
        let addr: SocketAddr =
            peer.as_str().parse().map_err(|_| DirectoryError::PeerUnreachable(peer.clone()))?;

        let mut stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) if is_unreachable(e.kind()) => {
                return Err(DirectoryError::PeerUnreachable(peer.clone()));
            },
            Err(e) => return Err(e.into()),
        };
        stream.set_nodelay(true)?;

        write_handshake(&mut stream, &local_id)
            .await
            .map_err(|_| DirectoryError::PeerUnreachable(peer.clone()))?;
        Ok(stream)
    }
}

fn is_unreachable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
            | ErrorKind::AddrNotAvailable
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> TcpDirectory {
        TcpDirectory::parse("127.0.0.1:0").unwrap()
    }

    #[tokio::test]
    async fn identifier_is_listen_address() {
        let directory = loopback();
        let id = directory.connect(None).await.unwrap();

        let addr: SocketAddr = id.as_str().parse().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert_eq!(directory.local_id(), Some(id));
    }

    #[tokio::test]
    async fn open_link_identifies_opener() {
        let host = Arc::new(loopback());
        let client = loopback();
        let host_id = host.connect(None).await.unwrap();
        let client_id = client.connect(None).await.unwrap();

        let accept = tokio::spawn({
            let host = Arc::clone(&host);
            async move { host.accept().await.map(|(peer, _)| peer) }
        });
        let _stream = client.open_link(&host_id).await.unwrap();

        assert_eq!(accept.await.unwrap().unwrap(), client_id);
    }

    #[tokio::test]
    async fn reconnect_rebinds_preferred_address() {
        let directory = loopback();
        let first = directory.connect(None).await.unwrap();

        let second = directory.connect(Some(&first)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_code_is_unreachable() {
        let directory = loopback();
        directory.connect(None).await.unwrap();

        let result = directory.open_link(&PeerId::from("not-an-address")).await;
        assert!(matches!(result, Err(DirectoryError::PeerUnreachable(_))));
    }
}
