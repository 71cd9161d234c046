//! Roster and host-side roster manager.
//!
//! ## Responsibilities
//!
//! - Roster: ordered participant list, unique by identifier, host first
//! - Admission: capacity check, snapshot to the joiner, delta to everyone else
//! - Removal: idempotent, one `participant-left` broadcast per departure
//! - Rejection grace: park rejected candidates until their deadline passes
//!
//! ## Design
//!
//! The manager is the only writer of the host's roster. It borrows the link
//! registry from the session for the duration of each call, so registration
//! and the sends it triggers happen in one step.

use huddle_proto::{Message, Participant, PeerId, RoomFull};

use crate::{
    config::RoomConfig,
    env::Timestamp,
    event::SessionAction,
    link::{LinkDirection, LinkRegistry},
    relay,
};

/// Ordered participant list, unique by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster containing only `host`.
    pub fn seeded(host: PeerId) -> Self {
        Self { participants: vec![Participant::host(host)] }
    }

    /// Roster built from a received snapshot. Later duplicates of an
    /// identifier are dropped.
    pub fn from_snapshot(participants: Vec<Participant>) -> Self {
        let mut roster = Self::new();
        for participant in participants {
            roster.push(participant);
        }
        roster
    }

    /// Append a participant. Returns false if the identifier is present.
    pub fn push(&mut self, participant: Participant) -> bool {
        if self.contains(&participant.identifier) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    /// Remove a participant. Returns false if it was not present.
    pub fn remove(&mut self, identifier: &PeerId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| &p.identifier != identifier);
        self.participants.len() != before
    }

    /// True if `identifier` is in the roster.
    pub fn contains(&self, identifier: &PeerId) -> bool {
        self.participants.iter().any(|p| &p.identifier == identifier)
    }

    /// The host entry, if present.
    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host())
    }

    /// Participants in order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Identifiers in order.
    pub fn identifiers(&self) -> impl Iterator<Item = &PeerId> {
        self.participants.iter().map(|p| &p.identifier)
    }

    /// Owned copy of the participant list.
    pub fn to_vec(&self) -> Vec<Participant> {
        self.participants.clone()
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Added to the roster and registered.
    Admitted,
    /// Room at capacity, `room-full` sent, close scheduled.
    Rejected,
    /// Identifier already present. Nothing changed.
    Duplicate,
}

#[derive(Debug, Clone)]
struct PendingRejection<I> {
    peer: PeerId,
    deadline: I,
}

/// Host-authoritative roster writer.
#[derive(Debug, Clone)]
pub struct RosterManager<I: Timestamp> {
    roster: Roster,
    config: RoomConfig,
    pending: Vec<PendingRejection<I>>,
}

impl<I: Timestamp> RosterManager<I> {
    /// Manager for a new room seeded with `host`.
    pub fn new(host: PeerId, config: RoomConfig) -> Self {
        Self { roster: Roster::seeded(host), config, pending: Vec::new() }
    }

    /// Current roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// True if `peer` was rejected and is waiting for its link to close.
    pub fn is_pending(&self, peer: &PeerId) -> bool {
        self.pending.iter().any(|p| &p.peer == peer)
    }

    /// Earliest rejection deadline.
    pub fn next_deadline(&self) -> Option<I> {
        self.pending.iter().map(|p| p.deadline).min()
    }

    /// Admit the candidate whose link just opened.
    ///
    /// At capacity the candidate gets `room-full` and is parked until
    /// `now + rejection_grace`. Otherwise it is appended as a client,
    /// registered, sent the full roster, and announced to every other link.
    /// The local `RosterChanged` is queued after all sends.
    pub fn admit(
        &mut self,
        links: &mut LinkRegistry,
        candidate: PeerId,
        now: I,
        actions: &mut Vec<SessionAction>,
    ) -> Admission {
        if self.roster.contains(&candidate)
            || links.contains(&candidate)
            || self.is_pending(&candidate)
        {
            return Admission::Duplicate;
        }

        if self.roster.len() >= self.config.max_participants {
            actions.push(SessionAction::Send {
                to: candidate.clone(),
                message: Message::RoomFull(RoomFull {}),
            });
            self.pending.push(PendingRejection {
                peer: candidate,
                deadline: now + self.config.rejection_grace,
            });
            return Admission::Rejected;
        }

        let participant = Participant::client(candidate.clone());
        self.roster.push(participant.clone());
        links.insert(candidate.clone(), LinkDirection::Inbound);

        relay::send(links, &candidate, Message::roster_snapshot(self.roster.to_vec()), actions);
        relay::relay(links, &Message::ParticipantJoined(participant), Some(&candidate), actions);
        actions.push(SessionAction::RosterChanged { roster: self.roster.to_vec() });

        Admission::Admitted
    }

    /// Remove a departed participant and announce it.
    ///
    /// Idempotent: returns false and emits nothing if `peer` is not in the
    /// roster. The host's own entry is never removed.
    pub fn remove(
        &mut self,
        links: &mut LinkRegistry,
        peer: &PeerId,
        actions: &mut Vec<SessionAction>,
    ) -> bool {
        links.remove(peer);

        if self.roster.host().is_some_and(|host| &host.identifier == peer) {
            return false;
        }
        if !self.roster.remove(peer) {
            return false;
        }

        relay::relay(links, &Message::participant_left(peer.clone()), None, actions);
        actions.push(SessionAction::RosterChanged { roster: self.roster.to_vec() });
        true
    }

    /// Forget a parked candidate whose link closed on its own.
    pub fn forget_pending(&mut self, peer: &PeerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| &p.peer != peer);
        self.pending.len() != before
    }

    /// Close every parked candidate whose deadline has passed.
    pub fn expire(&mut self, now: I, actions: &mut Vec<SessionAction>) -> usize {
        let (expired, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|p| p.deadline <= now);
        self.pending = waiting;

        let count = expired.len();
        for rejection in expired {
            actions.push(SessionAction::CloseLink { peer: rejection.peer });
        }
        count
    }

    /// Replace the host's identifier after a directory reassignment and
    /// push a fresh snapshot to every link.
    pub fn rename_host(
        &mut self,
        links: &mut LinkRegistry,
        new_id: PeerId,
        actions: &mut Vec<SessionAction>,
    ) {
        let clients: Vec<Participant> =
            self.roster.participants().iter().filter(|p| !p.is_host()).cloned().collect();

        let mut roster = Roster::seeded(new_id);
        for client in clients {
            roster.push(client);
        }
        self.roster = roster;

        relay::relay(links, &Message::roster_snapshot(self.roster.to_vec()), None, actions);
        actions.push(SessionAction::RosterChanged { roster: self.roster.to_vec() });
    }

    /// Close every admitted and parked link. Used when the host leaves.
    pub fn close_all(&mut self, links: &mut LinkRegistry, actions: &mut Vec<SessionAction>) {
        for peer in links.drain() {
            actions.push(SessionAction::CloseLink { peer });
        }
        for rejection in self.pending.drain(..) {
            actions.push(SessionAction::CloseLink { peer: rejection.peer });
        }
        self.roster = Roster::new();
    }
}
