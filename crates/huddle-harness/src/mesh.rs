//! In-memory mesh of sessions.
//!
//! The mesh plays directory and network for any number of [`Session`]s in a
//! single thread. Every ordered pair of participants has its own FIFO
//! channel; [`Mesh::step`] picks one non-empty channel with a seeded RNG and
//! delivers its head. Per-link order is therefore preserved while the order
//! across links is arbitrary but reproducible from the seed.
//!
//! ```text
//!   Session A ──actions──▶ channel (A→B) ──step──▶ events ──▶ Session B
//!             ◀──events─── channel (B→A) ◀─────────actions───
//! ```
//!
//! Links are keyed by the pair of identifiers, the same way the node driver
//! keys them by remote identifier. A frame only reaches its receiver while
//! the receiver still holds the link it arrived on.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    future::Future,
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use huddle_core::{
    DirectoryFailure, Environment, RoomConfig, Session, SessionAction, SessionError, SessionEvent,
    SessionState,
};
use huddle_proto::{Message, Participant, PeerId, decode, encode};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Upper bound on deliveries in one [`Mesh::run_until_quiescent`] call.
pub const MAX_STEPS: usize = 100_000;

/// Virtual instant: time elapsed since the mesh was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the start of the run.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Environment with a manually advanced clock.
///
/// The mesh never awaits, so `sleep` completes immediately.
#[derive(Debug, Clone)]
pub struct MeshEnv {
    clock: Arc<Mutex<SimInstant>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl MeshEnv {
    /// Clock at zero, random stream fixed by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(Mutex::new(SimInstant::default())),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *clock = *clock + by;
    }
}

impl Environment for MeshEnv {
    type Instant = SimInstant;

    fn now(&self) -> Self::Instant {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

/// One message handed to a link by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    /// Sending participant.
    pub from: PeerId,
    /// Remote end of the link.
    pub to: PeerId,
    /// Message as emitted, before encoding.
    pub message: Message,
}

#[derive(Debug, Clone)]
enum Wire {
    Open,
    Frame(Bytes),
    Close,
}

struct SimNode {
    session: Session<MeshEnv>,
    chats: Vec<(PeerId, String)>,
    received: Vec<(PeerId, Message)>,
}

/// Deterministic network of sessions.
pub struct Mesh {
    env: MeshEnv,
    config: RoomConfig,
    rng: ChaCha8Rng,
    nodes: BTreeMap<PeerId, SimNode>,
    channels: BTreeMap<(PeerId, PeerId), VecDeque<Wire>>,
    attached: BTreeSet<(PeerId, PeerId)>,
    local: VecDeque<(PeerId, SessionEvent)>,
    sent: Vec<Sent>,
    delivered: usize,
}

impl Mesh {
    /// Empty mesh with the default room configuration.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, RoomConfig::default())
    }

    /// Empty mesh whose participants all use `config`.
    pub fn with_config(seed: u64, config: RoomConfig) -> Self {
        Self {
            env: MeshEnv::with_seed(seed),
            config,
            rng: ChaCha8Rng::seed_from_u64(seed.rotate_left(32)),
            nodes: BTreeMap::new(),
            channels: BTreeMap::new(),
            attached: BTreeSet::new(),
            local: VecDeque::new(),
            sent: Vec::new(),
            delivered: 0,
        }
    }

    /// Start a participant and register it with the directory as `name`.
    pub fn add_participant(&mut self, name: &str) -> PeerId {
        let id = PeerId::from(name);
        let node = SimNode {
            session: Session::new(self.env.clone(), self.config.clone()),
            chats: Vec::new(),
            received: Vec::new(),
        };
        self.nodes.insert(id.clone(), node);
        let _ = self.dispatch(&id, SessionEvent::Start);
        id
    }

    /// Local intent: create a room.
    pub fn create_room(&mut self, id: &PeerId) -> Result<(), SessionError> {
        self.dispatch(id, SessionEvent::CreateRoom)
    }

    /// Local intent: join the room hosted by `host`.
    pub fn join(&mut self, id: &PeerId, host: &PeerId) -> Result<(), SessionError> {
        self.dispatch(id, SessionEvent::JoinRoom { code: host.clone() })
    }

    /// Local intent: leave the current room.
    pub fn leave(&mut self, id: &PeerId) -> Result<(), SessionError> {
        self.dispatch(id, SessionEvent::LeaveRoom)
    }

    /// Local intent: send chat.
    pub fn send_chat(&mut self, id: &PeerId, text: &str) -> Result<(), SessionError> {
        self.dispatch(id, SessionEvent::SendChat { text: text.to_string() })
    }

    /// Drop and immediately restore the directory connection of `id`.
    pub fn bounce_directory(&mut self, id: &PeerId) {
        let _ = self.dispatch(id, SessionEvent::DirectoryDisconnected);
    }

    /// Kill a participant. Its peers observe every link to it closing after
    /// whatever it had already queued.
    pub fn crash(&mut self, id: &PeerId) {
        if self.nodes.remove(id).is_none() {
            return;
        }
        let links: Vec<_> = self.attached.iter().filter(|(owner, _)| owner == id).cloned().collect();
        for link in links {
            self.attached.remove(&link);
            self.channels.entry(link).or_default().push_back(Wire::Close);
        }
    }

    /// Queue a raw frame from `from` to `to`, bypassing `from`'s session.
    pub fn inject_raw(&mut self, from: &PeerId, to: &PeerId, payload: Bytes) {
        self.channels.entry((from.clone(), to.clone())).or_default().push_back(Wire::Frame(payload));
    }

    /// Queue an encoded message from `from` to `to`, bypassing `from`'s
    /// session.
    pub fn inject(&mut self, from: &PeerId, to: &PeerId, message: &Message) {
        if let Ok(payload) = encode(message) {
            self.inject_raw(from, to, payload);
        }
    }

    /// Advance the shared clock and tick every participant.
    pub fn advance(&mut self, by: Duration) {
        self.env.advance(by);
        let ids: Vec<_> = self.nodes.keys().cloned().collect();
        for id in ids {
            let _ = self.dispatch(&id, SessionEvent::Tick);
        }
    }

    /// Deliver one queued item. Returns false when nothing is in flight.
    pub fn step(&mut self) -> bool {
        let mut ready: Vec<_> = self
            .channels
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        if ready.is_empty() {
            return false;
        }

        let (from, to) = ready.swap_remove(self.rng.gen_range(0..ready.len()));
        let Some(wire) =
            self.channels.get_mut(&(from.clone(), to.clone())).and_then(VecDeque::pop_front)
        else {
            return false;
        };

        self.delivered += 1;
        match wire {
            Wire::Open => self.deliver_open(&from, &to),
            Wire::Frame(payload) => self.deliver_frame(&from, &to, payload),
            Wire::Close => self.deliver_close(&from, &to),
        }
        true
    }

    /// Step until nothing is in flight, or [`MAX_STEPS`] deliveries.
    /// Returns the number of deliveries made.
    pub fn run_until_quiescent(&mut self) -> usize {
        let mut steps = 0;
        while steps < MAX_STEPS && self.step() {
            steps += 1;
        }
        steps
    }

    /// True when no channel holds anything.
    pub fn is_quiescent(&self) -> bool {
        self.channels.values().all(VecDeque::is_empty)
    }

    /// Shared environment.
    pub fn env(&self) -> &MeshEnv {
        &self.env
    }

    /// Total deliveries so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Participant identifiers, sorted.
    pub fn participants(&self) -> impl Iterator<Item = &PeerId> {
        self.nodes.keys()
    }

    /// Session of `id`, if it is alive.
    pub fn session(&self, id: &PeerId) -> Option<&Session<MeshEnv>> {
        self.nodes.get(id).map(|node| &node.session)
    }

    /// Session state of `id`.
    pub fn state(&self, id: &PeerId) -> Option<&SessionState> {
        self.session(id).map(Session::state)
    }

    /// Roster as seen by `id`.
    pub fn roster(&self, id: &PeerId) -> &[Participant] {
        self.session(id).map(Session::roster).unwrap_or_default()
    }

    /// Roster identifiers as seen by `id`, in roster order.
    pub fn roster_ids(&self, id: &PeerId) -> Vec<PeerId> {
        self.roster(id).iter().map(|p| p.identifier.clone()).collect()
    }

    /// Chat delivered to `id`'s user, in delivery order.
    pub fn chats(&self, id: &PeerId) -> &[(PeerId, String)] {
        self.nodes.get(id).map(|node| node.chats.as_slice()).unwrap_or_default()
    }

    /// Decodable messages that reached `id`'s session, with the link they
    /// arrived on.
    pub fn received(&self, id: &PeerId) -> &[(PeerId, Message)] {
        self.nodes.get(id).map(|node| node.received.as_slice()).unwrap_or_default()
    }

    /// Every message any session asked to send, in emission order.
    pub fn sent(&self) -> &[Sent] {
        &self.sent
    }

    /// True while `owner` holds a link to `remote`.
    pub fn is_linked(&self, owner: &PeerId, remote: &PeerId) -> bool {
        self.attached.contains(&(owner.clone(), remote.clone()))
    }

    fn dispatch(&mut self, id: &PeerId, event: SessionEvent) -> Result<(), SessionError> {
        let result = self.handle(id, event);
        while let Some((id, event)) = self.local.pop_front() {
            let _ = self.handle(&id, event);
        }
        result
    }

    fn handle(&mut self, id: &PeerId, event: SessionEvent) -> Result<(), SessionError> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Ok(());
        };
        let actions = node.session.handle(event)?;
        self.execute(id, actions);
        Ok(())
    }

    fn execute(&mut self, id: &PeerId, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::ConnectDirectory { .. } => {
                    let event = SessionEvent::DirectoryConnected { local_id: id.clone() };
                    self.local.push_back((id.clone(), event));
                },
                SessionAction::OpenLink { peer } => {
                    self.channels.entry((id.clone(), peer)).or_default().push_back(Wire::Open);
                },
                SessionAction::Send { to, message } => {
                    let link = (id.clone(), to.clone());
                    if self.attached.contains(&link) {
                        if let Ok(payload) = encode(&message) {
                            self.channels.entry(link).or_default().push_back(Wire::Frame(payload));
                        }
                    }
                    self.sent.push(Sent { from: id.clone(), to, message });
                },
                SessionAction::CloseLink { peer } => {
                    let link = (id.clone(), peer);
                    if self.attached.remove(&link) {
                        self.channels.entry(link).or_default().push_back(Wire::Close);
                    }
                },
                SessionAction::DeliverChat { sender, text } => {
                    if let Some(node) = self.nodes.get_mut(id) {
                        node.chats.push((sender, text));
                    }
                },
                SessionAction::RosterChanged { .. }
                | SessionAction::StateChanged { .. }
                | SessionAction::Log { .. } => {},
            }
        }
    }

    fn deliver_open(&mut self, from: &PeerId, to: &PeerId) {
        if !self.nodes.contains_key(from) {
            return;
        }

        let reachable = self.session(to).is_some_and(|session| {
            session.local_id().is_some() && !matches!(session.state(), SessionState::Errored { .. })
        });
        if !reachable {
            let failure = DirectoryFailure::PeerUnavailable { peer: to.clone() };
            let _ = self.dispatch(from, SessionEvent::DirectoryFailed(failure));
            return;
        }

        self.attached.insert((from.clone(), to.clone()));
        let _ = self.dispatch(from, SessionEvent::LinkOpened { peer: to.clone() });

        // A second stream from the same peer is dropped by the acceptor.
        if !self.attached.insert((to.clone(), from.clone())) {
            self.channels.entry((to.clone(), from.clone())).or_default().push_back(Wire::Close);
            return;
        }
        let _ = self.dispatch(to, SessionEvent::IncomingLink { peer: from.clone() });
        if self.is_linked(to, from) {
            let _ = self.dispatch(to, SessionEvent::LinkOpened { peer: from.clone() });
        }
    }

    fn deliver_frame(&mut self, from: &PeerId, to: &PeerId, payload: Bytes) {
        if !self.is_linked(to, from) {
            return;
        }
        if let (Ok(message), Some(node)) = (decode(&payload), self.nodes.get_mut(to)) {
            node.received.push((from.clone(), message));
        }
        let _ = self.dispatch(to, SessionEvent::FrameReceived { from: from.clone(), payload });
    }

    fn deliver_close(&mut self, from: &PeerId, to: &PeerId) {
        if self.attached.remove(&(to.clone(), from.clone())) {
            let _ = self.dispatch(to, SessionEvent::LinkClosed { peer: from.clone() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participants_reach_lobby_on_start() {
        let mut mesh = Mesh::new(1);
        let a = mesh.add_participant("a");

        assert_eq!(mesh.state(&a), Some(&SessionState::Lobby));
        assert_eq!(mesh.session(&a).and_then(Session::local_id), Some(&a));
    }

    #[test]
    fn join_to_missing_peer_returns_to_lobby() {
        let mut mesh = Mesh::new(2);
        let a = mesh.add_participant("a");

        mesh.join(&a, &PeerId::from("nobody")).unwrap();
        mesh.run_until_quiescent();

        assert_eq!(mesh.state(&a), Some(&SessionState::Lobby));
        assert!(mesh.is_quiescent());
    }

    #[test]
    fn frames_only_reach_current_links() {
        let mut mesh = Mesh::new(3);
        let host = mesh.add_participant("host");
        let stranger = mesh.add_participant("stranger");
        mesh.create_room(&host).unwrap();

        mesh.inject(&stranger, &host, &Message::chat("psst", stranger.clone()));
        mesh.run_until_quiescent();

        assert!(mesh.received(&host).is_empty());
        assert!(mesh.chats(&host).is_empty());
    }

    #[test]
    fn clock_only_moves_on_advance() {
        let mut mesh = Mesh::new(4);
        let start = mesh.env().now();
        mesh.add_participant("a");
        assert_eq!(mesh.env().now(), start);

        mesh.advance(Duration::from_millis(250));
        assert_eq!(mesh.env().now() - start, Duration::from_millis(250));
    }
}
