//! Model room world.
//!
//! Tracks, per participant, whether it is in the lobby, hosting, or joined
//! to a host, plus each host's roster and every participant's chat feed.
//! Delivery is instant: each operation leaves the world quiescent.

use std::collections::BTreeMap;

use super::operation::{ClientId, Operation, OperationError, OperationResult, SmallMessage};

/// Where a participant stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPhase {
    /// Not in a room.
    Lobby,
    /// Hosting a room.
    Hosting,
    /// In the room hosted by the given participant.
    Joined(ClientId),
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Per-participant phase.
    pub phases: Vec<ModelPhase>,
    /// Per-participant roster view, host first. Empty outside a room.
    pub rosters: Vec<Vec<ClientId>>,
    /// Per-participant chat feed as `(sender, text)`.
    pub chats: Vec<Vec<(ClientId, String)>>,
}

/// Reference implementation of a set of participants and their rooms.
#[derive(Debug, Clone)]
pub struct ModelRoom {
    capacity: usize,
    phases: Vec<ModelPhase>,
    /// Roster of every live room, keyed by host.
    rooms: BTreeMap<ClientId, Vec<ClientId>>,
    chats: Vec<Vec<(ClientId, String)>>,
}

impl ModelRoom {
    /// `num_clients` participants in the lobby; rooms hold at most
    /// `capacity` participants, host included.
    pub fn new(num_clients: usize, capacity: usize) -> Self {
        Self {
            capacity,
            phases: vec![ModelPhase::Lobby; num_clients],
            rooms: BTreeMap::new(),
            chats: vec![Vec::new(); num_clients],
        }
    }

    /// Number of participants.
    pub fn num_clients(&self) -> usize {
        self.phases.len()
    }

    /// Phase of one participant.
    pub fn phase(&self, id: ClientId) -> Option<ModelPhase> {
        self.phases.get(usize::from(id)).copied()
    }

    /// Roster as seen by `id`.
    pub fn roster_view(&self, id: ClientId) -> Vec<ClientId> {
        let host = match self.phase(id) {
            Some(ModelPhase::Hosting) => id,
            Some(ModelPhase::Joined(host)) => host,
            Some(ModelPhase::Lobby) | None => return Vec::new(),
        };
        self.rooms.get(&host).cloned().unwrap_or_default()
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::CreateRoom { client_id } => self.apply_create_room(*client_id),
            Operation::JoinRoom { client_id, host_id } => self.apply_join(*client_id, *host_id),
            Operation::LeaveRoom { client_id } => self.apply_leave(*client_id),
            Operation::SendChat { client_id, content } => self.apply_chat(*client_id, *content),
            Operation::BounceDirectory { client_id } => self.check_client(*client_id),
            Operation::AdvanceTime { .. } => OperationResult::Ok,
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let ids = 0..u8::try_from(self.num_clients()).unwrap_or(u8::MAX);
        ObservableState {
            phases: self.phases.clone(),
            rosters: ids.map(|id| self.roster_view(id)).collect(),
            chats: self.chats.clone(),
        }
    }

    fn check_client(&self, id: ClientId) -> OperationResult {
        if usize::from(id) < self.num_clients() {
            OperationResult::Ok
        } else {
            OperationResult::Error(OperationError::InvalidClient)
        }
    }

    fn apply_create_room(&mut self, id: ClientId) -> OperationResult {
        match self.phase(id) {
            None => OperationResult::Error(OperationError::InvalidClient),
            Some(ModelPhase::Lobby) => {
                self.phases[usize::from(id)] = ModelPhase::Hosting;
                self.rooms.insert(id, vec![id]);
                OperationResult::Ok
            },
            Some(_) => OperationResult::Error(OperationError::InvalidState),
        }
    }

    /// Joining is accepted from the lobby for any code but one's own. The
    /// attempt succeeds only if the target is hosting and has room; every
    /// other outcome leaves the joiner in the lobby.
    fn apply_join(&mut self, id: ClientId, host: ClientId) -> OperationResult {
        match self.phase(id) {
            None => return OperationResult::Error(OperationError::InvalidClient),
            Some(ModelPhase::Lobby) if id != host => {},
            Some(_) => return OperationResult::Error(OperationError::InvalidState),
        }

        if let Some(roster) = self.rooms.get_mut(&host) {
            if roster.len() < self.capacity {
                roster.push(id);
                self.phases[usize::from(id)] = ModelPhase::Joined(host);
            }
        }
        OperationResult::Ok
    }

    fn apply_leave(&mut self, id: ClientId) -> OperationResult {
        match self.phase(id) {
            None => OperationResult::Error(OperationError::InvalidClient),
            Some(ModelPhase::Lobby) => OperationResult::Error(OperationError::InvalidState),
            Some(ModelPhase::Hosting) => {
                // The whole room goes back to the lobby with its host.
                for member in self.rooms.remove(&id).unwrap_or_default() {
                    self.phases[usize::from(member)] = ModelPhase::Lobby;
                }
                self.phases[usize::from(id)] = ModelPhase::Lobby;
                OperationResult::Ok
            },
            Some(ModelPhase::Joined(host)) => {
                if let Some(roster) = self.rooms.get_mut(&host) {
                    roster.retain(|member| *member != id);
                }
                self.phases[usize::from(id)] = ModelPhase::Lobby;
                OperationResult::Ok
            },
        }
    }

    /// Every member of the sender's room, the sender included, sees the
    /// chat exactly once.
    fn apply_chat(&mut self, id: ClientId, content: SmallMessage) -> OperationResult {
        match self.phase(id) {
            None => return OperationResult::Error(OperationError::InvalidClient),
            Some(ModelPhase::Lobby) => return OperationResult::Error(OperationError::InvalidState),
            Some(_) => {},
        }

        let text = content.to_text();
        for member in self.roster_view(id) {
            self.chats[usize::from(member)].push((id, text.clone()));
        }
        OperationResult::Ok
    }
}
