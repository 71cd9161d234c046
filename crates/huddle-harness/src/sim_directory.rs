//! Directory over turmoil's simulated network.
//!
//! Identifiers are `host:port`, where `host` is the turmoil host name, so a
//! join code resolves through turmoil's DNS. Streams carry the same
//! handshake frame as the TCP directory.

use std::{
    io::ErrorKind,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use huddle_node::{
    Directory, DirectoryError, HANDSHAKE_TIMEOUT,
    framing::{read_handshake, write_handshake},
};
use huddle_proto::PeerId;
use turmoil::net::{TcpListener, TcpStream};

/// Switch that makes every directory registration fail while set.
#[derive(Debug, Clone, Default)]
pub struct Outage(Arc<AtomicBool>);

impl Outage {
    /// Start failing registrations.
    pub fn begin(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Stop failing registrations.
    pub fn end(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// True while registrations fail.
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Directory for a node running inside a turmoil host.
pub struct SimDirectory {
    host: String,
    port: u16,
    listener: Mutex<Option<Arc<TcpListener>>>,
    outage: Outage,
}

impl std::fmt::Debug for SimDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDirectory")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("outage", &self.outage)
            .finish_non_exhaustive()
    }
}

impl SimDirectory {
    /// Directory for turmoil host `host`, listening on `port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_outage(host, port, Outage::default())
    }

    /// Directory whose registrations fail while `outage` is active.
    pub fn with_outage(host: &str, port: u16, outage: Outage) -> Self {
        Self { host: host.to_string(), port, listener: Mutex::new(None), outage }
    }

    /// Identifier this directory assigns.
    pub fn identifier(&self) -> PeerId {
        PeerId::new(format!("{}:{}", self.host, self.port))
    }

    fn listener(&self) -> Result<Arc<TcpListener>, DirectoryError> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| DirectoryError::Unavailable("not connected".into()))
    }
}

#[async_trait]
impl Directory for SimDirectory {
    type Stream = TcpStream;

    async fn connect(&self, _preferred: Option<&PeerId>) -> Result<PeerId, DirectoryError> {
        if self.outage.is_active() {
            return Err(DirectoryError::Unavailable("directory outage".into()));
        }

        // Release the previous listener so the port can be bound again.
        self.listener.lock().unwrap_or_else(PoisonError::into_inner).take();

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("bind {}: {e}", self.port)))?;
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));

        Ok(self.identifier())
    }

    async fn accept(&self) -> Result<(PeerId, Self::Stream), DirectoryError> {
        let listener = self.listener()?;

        loop {
            let (mut stream, _) = listener.accept().await?;
            // An opener that never identifies itself is dropped.
            if let Ok(Ok(peer)) =
                tokio::time::timeout(HANDSHAKE_TIMEOUT, read_handshake(&mut stream)).await
            {
                return Ok((peer, stream));
            }
        }
    }

    async fn open_link(&self, peer: &PeerId) -> Result<Self::Stream, DirectoryError> {
        let mut stream = match TcpStream::connect(peer.as_str()).await {
            Ok(stream) => stream,
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                return Err(DirectoryError::PeerUnreachable(peer.clone()));
            },
            Err(e) => return Err(e.into()),
        };

        write_handshake(&mut stream, &self.identifier())
            .await
            .map_err(|_| DirectoryError::PeerUnreachable(peer.clone()))?;
        Ok(stream)
    }
}
