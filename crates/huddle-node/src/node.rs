//! Node driver.
//!
//! Glues a [`Session`] to a [`Directory`] and the tokio runtime. The node
//! loop is the only place the session is touched: link tasks, directory
//! tasks and the user all talk to it through channels, and the session's
//! actions are executed here without ever blocking the loop.
//!
//! ```text
//!   NodeHandle ──commands──▶ ┌──────────┐ ──events──▶ NodeHandle
//!   directory tasks ───────▶ │ Node loop│ ──frames──▶ link writers
//!   link readers ──────────▶ └──────────┘
//!                     deadline timer ─┘
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use huddle_core::{
    DirectoryFailure, Environment, LogLevel, Session, SessionAction, SessionError, SessionEvent,
    SessionState,
};
use huddle_proto::{MAX_PAYLOAD_SIZE, Message, Participant, PeerId, encode};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    config::NodeConfig,
    directory::Directory,
    error::{DirectoryError, NodeError},
    link::{LinkHandle, LinkId, LinkInput},
};

/// User intents accepted by a running node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCommand {
    /// Create a room and host it.
    CreateRoom,
    /// Join the room hosted by `code`.
    JoinRoom {
        /// Host identifier.
        code: PeerId,
    },
    /// Leave the current room.
    LeaveRoom,
    /// Send chat text to the room.
    SendChat {
        /// Chat body.
        text: String,
    },
    /// Stop the node.
    Shutdown,
}

/// Observable output of a running node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// The directory assigned this identifier. It is the join code for a
    /// room hosted here.
    Identifier(PeerId),
    /// Session state changed.
    StateChanged(SessionState),
    /// Local roster changed.
    RosterChanged(Vec<Participant>),
    /// Chat to display.
    Chat {
        /// Authoritative sender.
        sender: PeerId,
        /// Chat body.
        text: String,
    },
    /// Session log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Log message.
        message: String,
    },
    /// A command was not valid in the current state.
    CommandFailed(SessionError),
}

/// User side of a node: send commands, receive events.
///
/// The event stream is lossy. The node never waits for a slow reader: once
/// [`NodeConfig::event_buffer`] events are queued, further events are
/// dropped and counted in [`NodeHandle::dropped_events`]. Session state and
/// roster stay authoritative inside the node.
#[derive(Debug)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
    events: mpsc::Receiver<NodeEvent>,
    dropped: Arc<AtomicU64>,
}

impl NodeHandle {
    /// Send a command to the node.
    pub async fn send(&self, command: NodeCommand) -> Result<(), NodeError> {
        self.commands.send(command).await.map_err(|_| NodeError::Stopped)
    }

    /// Next node event. `None` once the node has stopped.
    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.events.recv().await
    }

    /// Events discarded because the buffer was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Split into the raw command sender and event receiver.
    pub fn into_parts(self) -> (mpsc::Sender<NodeCommand>, mpsc::Receiver<NodeEvent>) {
        (self.commands, self.events)
    }
}

/// Results of directory work done off the node loop.
enum DirectoryInput<S> {
    Connected(PeerId),
    Lost(String),
    Failed(DirectoryFailure),
    Inbound { peer: PeerId, stream: S },
    Opened { peer: PeerId, stream: S },
    OpenFailed { peer: PeerId, reason: String },
}

/// A participant process.
///
/// # Type Parameters
///
/// - `D`: Directory used for identifiers and links
/// - `E`: Environment implementation for time/randomness
pub struct Node<D: Directory, E: Environment> {
    session: Session<E>,
    env: E,
    config: NodeConfig,
    directory: Arc<D>,

    links: HashMap<PeerId, LinkHandle>,
    next_link: LinkId,

    directory_tx: mpsc::UnboundedSender<DirectoryInput<D::Stream>>,
    directory_rx: mpsc::UnboundedReceiver<DirectoryInput<D::Stream>>,
    link_tx: mpsc::UnboundedSender<LinkInput>,
    link_rx: mpsc::UnboundedReceiver<LinkInput>,
    commands: mpsc::Receiver<NodeCommand>,
    events: mpsc::Sender<NodeEvent>,
    dropped: Arc<AtomicU64>,

    acceptor: Option<JoinHandle<()>>,
    connector: Option<JoinHandle<()>>,
}

impl<D: Directory, E: Environment> Node<D, E> {
    /// Create a node and the handle used to drive it.
    pub fn new(directory: D, env: E, config: NodeConfig) -> (Self, NodeHandle) {
        let (directory_tx, directory_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(config.event_buffer.max(1));
        let (events, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        let node = Self {
            session: Session::new(env.clone(), config.room.clone()),
            env,
            config,
            directory: Arc::new(directory),
            links: HashMap::new(),
            next_link: 0,
            directory_tx,
            directory_rx,
            link_tx,
            link_rx,
            commands,
            events,
            dropped: Arc::clone(&dropped),
            acceptor: None,
            connector: None,
        };

        (node, NodeHandle { commands: command_tx, events: event_rx, dropped })
    }

    /// Session state.
    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    /// Run until shutdown, handle drop, or a fatal directory failure.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Directory` if the directory fails fatally.
    pub async fn run(mut self) -> Result<(), NodeError> {
        self.dispatch(SessionEvent::Start);

        let result = loop {
            if let SessionState::Errored { reason } = self.session.state() {
                break Err(NodeError::Directory(DirectoryError::Unavailable(reason.clone())));
            }

            let wait = self.until_deadline();

            tokio::select! {
                Some(input) = self.directory_rx.recv() => self.on_directory(input),
                Some(input) = self.link_rx.recv() => self.on_link(input),
                command = self.commands.recv() => match command {
                    Some(NodeCommand::Shutdown) | None => break Ok(()),
                    Some(command) => self.on_command(command),
                },
                () = sleep_for(&self.env, wait) => self.dispatch(SessionEvent::Tick),
            }
        };

        self.shutdown();
        result
    }

    fn until_deadline(&self) -> Option<Duration> {
        let deadline = self.session.next_deadline()?;
        let now = self.env.now();
        Some(if deadline > now { deadline - now } else { Duration::ZERO })
    }

    fn on_command(&mut self, command: NodeCommand) {
        let event = match command {
            NodeCommand::CreateRoom => SessionEvent::CreateRoom,
            NodeCommand::JoinRoom { code } => SessionEvent::JoinRoom { code },
            NodeCommand::LeaveRoom => SessionEvent::LeaveRoom,
            NodeCommand::SendChat { text } => SessionEvent::SendChat { text },
            NodeCommand::Shutdown => return,
        };
        self.dispatch(event);
    }

    fn on_directory(&mut self, input: DirectoryInput<D::Stream>) {
        match input {
            DirectoryInput::Connected(local_id) => {
                self.spawn_acceptor();
                self.emit(NodeEvent::Identifier(local_id.clone()));
                self.dispatch(SessionEvent::DirectoryConnected { local_id });
            },
            DirectoryInput::Lost(reason) => {
                tracing::warn!("directory lost: {reason}");
                self.dispatch(SessionEvent::DirectoryDisconnected);
            },
            DirectoryInput::Failed(failure) => {
                self.dispatch(SessionEvent::DirectoryFailed(failure));
            },
            DirectoryInput::Inbound { peer, stream } => {
                if self.links.contains_key(&peer) {
                    tracing::debug!("dropping second inbound stream from {peer}");
                    return;
                }
                self.register(peer.clone(), stream);
                self.dispatch(SessionEvent::IncomingLink { peer: peer.clone() });
                // The session may already have refused it.
                if self.links.contains_key(&peer) {
                    self.dispatch(SessionEvent::LinkOpened { peer });
                }
            },
            DirectoryInput::Opened { peer, stream } => {
                self.register(peer.clone(), stream);
                self.dispatch(SessionEvent::LinkOpened { peer });
            },
            DirectoryInput::OpenFailed { peer, reason } => {
                self.dispatch(SessionEvent::LinkFailed {
                    peer: peer.clone(),
                    kind: "open".into(),
                    text: reason,
                });
                self.dispatch(SessionEvent::LinkClosed { peer });
            },
        }
    }

    fn on_link(&mut self, input: LinkInput) {
        match input {
            LinkInput::Frame { peer, link, payload } => {
                if self.is_current(&peer, link) {
                    self.dispatch(SessionEvent::FrameReceived { from: peer, payload });
                }
            },
            LinkInput::Failed { peer, link, kind, text } => {
                if self.is_current(&peer, link) {
                    self.dispatch(SessionEvent::LinkFailed { peer, kind, text });
                }
            },
            LinkInput::Closed { peer, link } => {
                if self.is_current(&peer, link) {
                    if let Some(handle) = self.links.remove(&peer) {
                        handle.close();
                    }
                    self.dispatch(SessionEvent::LinkClosed { peer });
                }
            },
        }
    }

    fn is_current(&self, peer: &PeerId, link: LinkId) -> bool {
        self.links.get(peer).is_some_and(|handle| handle.id() == link)
    }

    fn dispatch(&mut self, event: SessionEvent) {
        match self.session.handle(event) {
            Ok(actions) => self.execute(actions),
            Err(e) => {
                tracing::warn!("command rejected: {e}");
                self.emit(NodeEvent::CommandFailed(e));
            },
        }
    }

    fn execute(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::ConnectDirectory { preferred } => self.spawn_connect(preferred),
                SessionAction::OpenLink { peer } => self.spawn_open(peer),
                SessionAction::Send { to, message } => self.send(&to, &message),
                SessionAction::CloseLink { peer } => {
                    if let Some(handle) = self.links.remove(&peer) {
                        handle.close();
                    }
                },
                SessionAction::RosterChanged { roster } => {
                    self.emit(NodeEvent::RosterChanged(roster));
                },
                SessionAction::DeliverChat { sender, text } => {
                    self.emit(NodeEvent::Chat { sender, text });
                },
                SessionAction::StateChanged { state } => {
                    tracing::info!("state: {state}");
                    self.emit(NodeEvent::StateChanged(state));
                },
                SessionAction::Log { level, message } => {
                    match level {
                        LogLevel::Debug => tracing::debug!("{message}"),
                        LogLevel::Info => tracing::info!("{message}"),
                        LogLevel::Warn => tracing::warn!("{message}"),
                        LogLevel::Error => tracing::error!("{message}"),
                    }
                    self.emit(NodeEvent::Log { level, message });
                },
            }
        }
    }

    /// Queue one message on one link. Failures stay local to that send.
    fn send(&mut self, to: &PeerId, message: &Message) {
        let Some(link) = self.links.get(to) else {
            tracing::debug!("send to {to} dropped: link gone");
            return;
        };

        let payload = match encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("failed to encode {}: {e}", message.kind());
                return;
            },
        };
        if payload.len() > MAX_PAYLOAD_SIZE {
            tracing::warn!("send to {to} dropped: {} bytes exceeds frame limit", payload.len());
            return;
        }

        if !link.send(payload) {
            tracing::debug!("send to {to} dropped: writer stopped");
        }
    }

    fn register(&mut self, peer: PeerId, stream: D::Stream) {
        self.next_link += 1;
        let handle = LinkHandle::spawn(
            peer.clone(),
            self.next_link,
            stream,
            self.link_tx.clone(),
            self.config.broadcast_policy,
            self.env.clone(),
        );

        if let Some(previous) = self.links.insert(peer, handle) {
            previous.close();
        }
    }

    fn spawn_connect(&mut self, preferred: Option<PeerId>) {
        let directory = Arc::clone(&self.directory);
        let inputs = self.directory_tx.clone();
        let env = self.env.clone();
        let backoff = self.config.reconnect;

        if let Some(previous) = self.connector.take() {
            previous.abort();
        }

        self.connector = Some(tokio::spawn(async move {
            // First registration: failure is fatal.
            let Some(preferred) = preferred else {
                let input = match directory.connect(None).await {
                    Ok(local_id) => DirectoryInput::Connected(local_id),
                    Err(e) => {
                        DirectoryInput::Failed(DirectoryFailure::Fatal { reason: e.to_string() })
                    },
                };
                let _ = inputs.send(input);
                return;
            };

            let mut attempt = 0;
            loop {
                match directory.connect(Some(&preferred)).await {
                    Ok(local_id) => {
                        let _ = inputs.send(DirectoryInput::Connected(local_id));
                        return;
                    },
                    Err(e) => {
                        let delay = backoff.delay(attempt);
                        tracing::warn!("directory reconnect failed, retrying in {delay:?}: {e}");
                        attempt = attempt.saturating_add(1);
                        env.sleep(delay).await;
                    },
                }
            }
        }));
    }

    fn spawn_acceptor(&mut self) {
        let directory = Arc::clone(&self.directory);
        let inputs = self.directory_tx.clone();

        if let Some(previous) = self.acceptor.take() {
            previous.abort();
        }

        self.acceptor = Some(tokio::spawn(async move {
            loop {
                match directory.accept().await {
                    Ok((peer, stream)) => {
                        if inputs.send(DirectoryInput::Inbound { peer, stream }).is_err() {
                            return;
                        }
                    },
                    Err(e) => {
                        let _ = inputs.send(DirectoryInput::Lost(e.to_string()));
                        return;
                    },
                }
            }
        }));
    }

    fn spawn_open(&self, peer: PeerId) {
        let directory = Arc::clone(&self.directory);
        let inputs = self.directory_tx.clone();

        tokio::spawn(async move {
            let input = match directory.open_link(&peer).await {
                Ok(stream) => DirectoryInput::Opened { peer, stream },
                Err(DirectoryError::PeerUnreachable(peer)) => {
                    DirectoryInput::Failed(DirectoryFailure::PeerUnavailable { peer })
                },
                Err(e) => DirectoryInput::OpenFailed { peer, reason: e.to_string() },
            };
            let _ = inputs.send(input);
        });
    }

    fn emit(&self, event: NodeEvent) {
        match self.events.try_send(event) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!("event buffer full, {total} node event(s) dropped");
            },
            // Nobody is listening any more.
            Err(mpsc::error::TrySendError::Closed(_)) => {},
        }
    }

    fn shutdown(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        if let Some(connector) = self.connector.take() {
            connector.abort();
        }
        for (_, handle) in self.links.drain() {
            handle.close();
        }
    }
}

async fn sleep_for<E: Environment>(env: &E, wait: Option<Duration>) {
    match wait {
        Some(duration) => env.sleep(duration).await,
        None => std::future::pending().await,
    }
}
