//! Fuzz target for the [`Session`] state machine
//!
//! Drive one participant with arbitrary directory, link, frame, timer and
//! intent events, in any order.
//!
//! # Strategy
//!
//! - Small peer pool: four identifiers so links, joins and frames collide
//! - Frames: well-formed messages of every kind plus raw garbage
//! - Time: ticks advance a manual clock past rejection deadlines
//!
//! # Invariants
//!
//! - NEVER panic on any event sequence
//! - A hosted roster never exceeds `max_participants`
//! - Roster identifiers are unique
//! - While hosting, the roster starts with the local participant as host
//! - Outside a room, the roster is empty
//! - `Errored` is terminal
//! - Every `CloseLink` is for a peer the session no longer holds a link to

#![no_main]

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use arbitrary::Arbitrary;
use bytes::Bytes;
use huddle_core::{
    DirectoryFailure, Environment, RoomConfig, Session, SessionAction, SessionEvent, SessionState,
};
use huddle_proto::{Message, Participant, PeerId, RoomFull, encode};
use libfuzzer_sys::fuzz_target;

/// Time as a Duration since epoch 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FuzzInstant(Duration);

impl Add<Duration> for FuzzInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub for FuzzInstant {
    type Output = Duration;

    fn sub(self, other: Self) -> Duration {
        self.0.saturating_sub(other.0)
    }
}

#[derive(Clone)]
struct FuzzEnv {
    now: Arc<Mutex<FuzzInstant>>,
}

impl FuzzEnv {
    fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = *now + by;
    }
}

impl Environment for FuzzEnv {
    type Instant = FuzzInstant;

    fn now(&self) -> FuzzInstant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0);
    }
}

const PEERS: [&str; 4] = ["p0", "p1", "p2", "p3"];

fn peer(index: u8) -> PeerId {
    PeerId::from(PEERS[usize::from(index) % PEERS.len()])
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Start,
    DirectoryConnected { local: u8 },
    DirectoryDisconnected,
    PeerUnavailable { peer: u8 },
    DirectoryFatal,
    IncomingLink { peer: u8 },
    LinkOpened { peer: u8 },
    LinkClosed { peer: u8 },
    LinkFailed { peer: u8 },
    Frame { from: u8, message: FuzzedMessage },
    Tick { advance_millis: u16 },
    CreateRoom,
    JoinRoom { host: u8 },
    LeaveRoom,
    SendChat { text: String },
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzedMessage {
    Chat { text: String, sender: u8 },
    RosterSnapshot { members: Vec<(u8, bool)> },
    ParticipantJoined { peer: u8 },
    ParticipantLeft { peer: u8 },
    RoomFull,
    Garbage(Vec<u8>),
}

impl FuzzedMessage {
    fn payload(self) -> Bytes {
        let message = match self {
            Self::Chat { text, sender } => Message::chat(text, peer(sender)),
            Self::RosterSnapshot { members } => Message::roster_snapshot(
                members
                    .into_iter()
                    .map(|(index, host)| {
                        if host {
                            Participant::host(peer(index))
                        } else {
                            Participant::client(peer(index))
                        }
                    })
                    .collect(),
            ),
            Self::ParticipantJoined { peer: index } => {
                Message::ParticipantJoined(Participant::client(peer(index)))
            },
            Self::ParticipantLeft { peer: index } => Message::participant_left(peer(index)),
            Self::RoomFull => Message::RoomFull(RoomFull {}),
            Self::Garbage(bytes) => return Bytes::from(bytes),
        };
        encode(&message).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    max_participants: u8,
    events: Vec<FuzzEvent>,
}

fuzz_target!(|input: FuzzInput| {
    let config = RoomConfig {
        max_participants: usize::from(input.max_participants % 8).max(1),
        ..RoomConfig::default()
    };
    let env = FuzzEnv { now: Arc::new(Mutex::new(FuzzInstant(Duration::ZERO))) };
    let mut session = Session::new(env.clone(), config.clone());

    for event in input.events {
        let was_errored = matches!(session.state(), SessionState::Errored { .. });

        let event = match event {
            FuzzEvent::Start => SessionEvent::Start,
            FuzzEvent::DirectoryConnected { local } => {
                SessionEvent::DirectoryConnected { local_id: peer(local) }
            },
            FuzzEvent::DirectoryDisconnected => SessionEvent::DirectoryDisconnected,
            FuzzEvent::PeerUnavailable { peer: index } => SessionEvent::DirectoryFailed(
                DirectoryFailure::PeerUnavailable { peer: peer(index) },
            ),
            FuzzEvent::DirectoryFatal => {
                SessionEvent::DirectoryFailed(DirectoryFailure::Fatal { reason: "fuzz".into() })
            },
            FuzzEvent::IncomingLink { peer: index } => SessionEvent::IncomingLink { peer: peer(index) },
            FuzzEvent::LinkOpened { peer: index } => SessionEvent::LinkOpened { peer: peer(index) },
            FuzzEvent::LinkClosed { peer: index } => SessionEvent::LinkClosed { peer: peer(index) },
            FuzzEvent::LinkFailed { peer: index } => SessionEvent::LinkFailed {
                peer: peer(index),
                kind: "io".into(),
                text: "fuzz".into(),
            },
            FuzzEvent::Frame { from, message } => {
                SessionEvent::FrameReceived { from: peer(from), payload: message.payload() }
            },
            FuzzEvent::Tick { advance_millis } => {
                env.advance(Duration::from_millis(u64::from(advance_millis)));
                SessionEvent::Tick
            },
            FuzzEvent::CreateRoom => SessionEvent::CreateRoom,
            FuzzEvent::JoinRoom { host } => SessionEvent::JoinRoom { code: peer(host) },
            FuzzEvent::LeaveRoom => SessionEvent::LeaveRoom,
            FuzzEvent::SendChat { text } => SessionEvent::SendChat { text },
        };

        let actions = session.handle(event).unwrap_or_default();

        if was_errored {
            assert!(
                matches!(session.state(), SessionState::Errored { .. }),
                "left Errored for {:?}",
                session.state()
            );
        }

        for action in &actions {
            if let SessionAction::CloseLink { peer } = action {
                assert!(!session.links().contains(peer), "closed {peer} but still linked");
            }
        }

        let roster = session.roster();
        for (i, participant) in roster.iter().enumerate() {
            assert!(
                roster[..i].iter().all(|p| p.identifier != participant.identifier),
                "duplicate {} in {roster:?}",
                participant.identifier
            );
        }

        match session.state() {
            SessionState::Hosting => {
                let first = roster.first().expect("hosting with an empty roster");
                assert_eq!(Some(&first.identifier), session.local_id());
                assert!(first.is_host());
                assert!(roster.len() <= config.max_participants, "roster {roster:?}");
            },
            SessionState::Joined { .. } => {},
            _ => assert!(roster.is_empty(), "roster outside a room: {roster:?}"),
        }
    }
});
