//! Session state machine.
//!
//! The `Session` owns everything one participant knows: its directory
//! identifier, its link registry, its event log and, while in a room, the
//! role strategy. It is a pure state machine: events in, actions out.
//!
//! # Transition table
//!
//! ```text
//! Uninitialized --Start--> DirectoryConnecting --DirectoryConnected--> Lobby
//! Lobby --CreateRoom--> Hosting
//! Lobby --JoinRoom--> Joining --LinkOpened(host)--> Joined
//! Joining --LinkClosed(host) | PeerUnavailable(host)--> Lobby
//! Hosting | Joined --LeaveRoom--> Lobby
//! Joined --LinkClosed(host) | room-full--> Lobby
//! any --DirectoryFailed(Fatal)--> Errored
//! ```

use huddle_proto::{Message, Participant, PeerId, ProtocolError, Role, decode};

use crate::{
    config::RoomConfig,
    env::Environment,
    error::SessionError,
    event::{DirectoryFailure, SessionAction, SessionEvent, SessionState},
    event_log::{EventLog, LogLevel},
    link::LinkRegistry,
    relay,
    strategy::{
        ClientForwardStrategy, HostRelayStrategy, RoomContext, RoomEnd, RoomOutcome, RoomStrategy,
    },
};

/// One participant's session.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
pub struct Session<E: Environment> {
    env: E,
    config: RoomConfig,
    state: SessionState,
    local_id: Option<PeerId>,
    links: LinkRegistry,
    room: Option<Box<dyn RoomStrategy<E::Instant>>>,
    events: EventLog,
}

impl<E: Environment> Session<E> {
    /// Create an uninitialized session.
    pub fn new(env: E, config: RoomConfig) -> Self {
        let events = EventLog::new(config.event_log_capacity);
        Self {
            env,
            config,
            state: SessionState::Uninitialized,
            local_id: None,
            links: LinkRegistry::new(),
            room: None,
            events,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Role in the current room.
    pub fn role(&self) -> Option<Role> {
        self.room.as_ref().map(|room| room.role())
    }

    /// Directory-assigned identifier, once connected.
    pub fn local_id(&self) -> Option<&PeerId> {
        self.local_id.as_ref()
    }

    /// Local roster. Empty outside a room.
    pub fn roster(&self) -> &[Participant] {
        self.room.as_ref().map_or(&[], |room| room.roster().participants())
    }

    /// Observable event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Open links.
    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    /// Room configuration.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Earliest time at which a [`SessionEvent::Tick`] has work to do.
    pub fn next_deadline(&self) -> Option<E::Instant> {
        self.room.as_ref().and_then(|room| room.next_deadline())
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` for local intents that do not
    /// apply in the current state and `SessionError::Errored` for any intent
    /// after a fatal directory failure. Transport events never fail.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>, SessionError> {
        let mut actions = Vec::new();

        match event {
            SessionEvent::Start => self.handle_start(&mut actions)?,
            SessionEvent::DirectoryConnected { local_id } => {
                self.handle_directory_connected(local_id, &mut actions);
            },
            SessionEvent::DirectoryDisconnected => self.handle_directory_disconnected(&mut actions),
            SessionEvent::DirectoryFailed(failure) => {
                self.handle_directory_failed(failure, &mut actions);
            },
            SessionEvent::IncomingLink { peer } => self.handle_incoming_link(peer, &mut actions),
            SessionEvent::LinkOpened { peer } => self.handle_link_opened(peer, &mut actions),
            SessionEvent::LinkClosed { peer } => self.handle_link_closed(&peer, &mut actions),
            SessionEvent::LinkFailed { peer, kind, text } => {
                self.report(&SessionError::LinkError { peer, kind, text }, &mut actions);
            },
            SessionEvent::FrameReceived { from, payload } => {
                self.handle_frame(&from, &payload, &mut actions);
            },
            SessionEvent::Tick => {
                self.with_room(&mut actions, |room, ctx| room.tick(ctx));
            },
            SessionEvent::CreateRoom => self.handle_create_room(&mut actions)?,
            SessionEvent::JoinRoom { code } => self.handle_join_room(code, &mut actions)?,
            SessionEvent::LeaveRoom => self.handle_leave_room(&mut actions)?,
            SessionEvent::SendChat { text } => self.handle_send_chat(text, &mut actions)?,
        }

        Ok(actions)
    }

    fn handle_start(&mut self, actions: &mut Vec<SessionAction>) -> Result<(), SessionError> {
        self.check_not_errored()?;
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::InvalidState { reason: "session already started".into() });
        }

        self.transition(SessionState::DirectoryConnecting, actions);
        actions.push(SessionAction::ConnectDirectory { preferred: None });
        Ok(())
    }

    fn handle_directory_connected(&mut self, local_id: PeerId, actions: &mut Vec<SessionAction>) {
        if matches!(self.state, SessionState::Errored { .. }) {
            return;
        }

        match self.local_id.replace(local_id.clone()) {
            Some(previous) if previous != local_id => {
                self.log(
                    LogLevel::Warn,
                    format!("directory reassigned identifier {previous} -> {local_id}"),
                    actions,
                );
                self.with_room(actions, |room, ctx| room.local_id_changed(ctx, &local_id));
            },
            Some(_) => {
                self.log(LogLevel::Info, format!("reconnected to directory as {local_id}"), actions);
            },
            None => {
                self.log(LogLevel::Info, format!("connected to directory as {local_id}"), actions);
            },
        }

        if matches!(self.state, SessionState::Uninitialized | SessionState::DirectoryConnecting) {
            self.transition(SessionState::Lobby, actions);
        }
    }

    fn handle_directory_disconnected(&mut self, actions: &mut Vec<SessionAction>) {
        if matches!(self.state, SessionState::Uninitialized | SessionState::Errored { .. }) {
            return;
        }

        self.log(LogLevel::Warn, "directory connection lost, reconnecting", actions);
        if self.state == SessionState::Lobby {
            self.transition(SessionState::DirectoryConnecting, actions);
        }
        actions.push(SessionAction::ConnectDirectory { preferred: self.local_id.clone() });
    }

    fn handle_directory_failed(
        &mut self,
        failure: DirectoryFailure,
        actions: &mut Vec<SessionAction>,
    ) {
        match failure {
            DirectoryFailure::PeerUnavailable { peer } => {
                if matches!(&self.state, SessionState::Joining { host } if *host == peer) {
                    self.report(&SessionError::PeerUnreachable { peer }, actions);
                    self.transition(SessionState::Lobby, actions);
                } else {
                    self.log(LogLevel::Debug, format!("stale peer-unavailable for {peer}"), actions);
                }
            },
            DirectoryFailure::Fatal { reason } => {
                if matches!(self.state, SessionState::Errored { .. }) {
                    return;
                }
                self.teardown(actions);
                self.report(&SessionError::DirectoryUnavailable { reason: reason.clone() }, actions);
                self.transition(SessionState::Errored { reason }, actions);
            },
        }
    }

    fn handle_incoming_link(&mut self, peer: PeerId, actions: &mut Vec<SessionAction>) {
        let handled = self.with_room(actions, |room, ctx| room.incoming_link(ctx, peer.clone()));
        if handled.is_none() {
            self.log(LogLevel::Debug, format!("refusing inbound link from {peer}: not hosting"), actions);
            actions.push(SessionAction::CloseLink { peer });
        }
    }

    fn handle_link_opened(&mut self, peer: PeerId, actions: &mut Vec<SessionAction>) {
        if matches!(&self.state, SessionState::Joining { host } if *host == peer) {
            self.room = Some(Box::new(ClientForwardStrategy::new(peer.clone(), &mut self.links)));
            self.log(LogLevel::Info, format!("joined room hosted by {peer}"), actions);
            self.transition(SessionState::Joined { host: peer }, actions);
            return;
        }

        let handled = self.with_room(actions, |room, ctx| room.link_opened(ctx, peer.clone()));
        if handled.is_none() {
            self.log(LogLevel::Warn, format!("closing unexpected link to {peer}"), actions);
            actions.push(SessionAction::CloseLink { peer });
        }
    }

    fn handle_link_closed(&mut self, peer: &PeerId, actions: &mut Vec<SessionAction>) {
        if matches!(&self.state, SessionState::Joining { host } if host == peer) {
            self.report(&SessionError::PeerUnreachable { peer: peer.clone() }, actions);
            self.transition(SessionState::Lobby, actions);
            return;
        }

        if let Some(RoomOutcome::Ended(end)) =
            self.with_room(actions, |room, ctx| room.link_closed(ctx, peer))
        {
            self.end_room(end, actions);
        }
    }

    fn handle_frame(&mut self, from: &PeerId, payload: &[u8], actions: &mut Vec<SessionAction>) {
        if self.room.is_none() {
            self.log(LogLevel::Debug, format!("dropping frame from {from}: not in a room"), actions);
            return;
        }

        let message = match decode(payload) {
            Ok(message) => message,
            Err(ProtocolError::UnknownKind(kind)) => {
                let error = SessionError::UnknownMessageKind { from: from.clone(), kind };
                self.report(&error, actions);
                return;
            },
            Err(e) => {
                let error = SessionError::MalformedMessage { from: from.clone(), reason: e.to_string() };
                self.report(&error, actions);
                return;
            },
        };

        if let Some(RoomOutcome::Ended(end)) =
            self.with_room(actions, |room, ctx| room.message_received(ctx, from, message))
        {
            self.end_room(end, actions);
        }
    }

    fn handle_create_room(&mut self, actions: &mut Vec<SessionAction>) -> Result<(), SessionError> {
        self.check_not_errored()?;
        let local_id = match (&self.state, &self.local_id) {
            (SessionState::Lobby, Some(id)) => id.clone(),
            (state, _) => {
                return Err(SessionError::InvalidState {
                    reason: format!("cannot create a room while {state}"),
                });
            },
        };

        let host = HostRelayStrategy::new(local_id.clone(), self.config.clone());
        self.room = Some(Box::new(host));
        self.transition(SessionState::Hosting, actions);
        actions.push(SessionAction::RosterChanged { roster: self.roster().to_vec() });
        self.log(LogLevel::Info, format!("hosting room {local_id}"), actions);
        Ok(())
    }

    fn handle_join_room(
        &mut self,
        code: PeerId,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        self.check_not_errored()?;
        if self.state != SessionState::Lobby {
            return Err(SessionError::InvalidState {
                reason: format!("cannot join a room while {}", self.state),
            });
        }
        if self.local_id.as_ref() == Some(&code) {
            return Err(SessionError::InvalidState { reason: "cannot join own room".into() });
        }

        self.log(LogLevel::Info, format!("joining {code}"), actions);
        self.transition(SessionState::Joining { host: code.clone() }, actions);
        actions.push(SessionAction::OpenLink { peer: code });
        Ok(())
    }

    fn handle_leave_room(&mut self, actions: &mut Vec<SessionAction>) -> Result<(), SessionError> {
        self.check_not_errored()?;
        if !matches!(
            self.state,
            SessionState::Joining { .. } | SessionState::Hosting | SessionState::Joined { .. }
        ) {
            return Err(SessionError::InvalidState {
                reason: format!("cannot leave a room while {}", self.state),
            });
        }

        self.teardown(actions);
        self.log(LogLevel::Info, "left room", actions);
        self.transition(SessionState::Lobby, actions);
        Ok(())
    }

    fn handle_send_chat(
        &mut self,
        text: String,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        self.check_not_errored()?;
        let (Some(_), Some(local_id)) = (&self.room, &self.local_id) else {
            return Err(SessionError::InvalidState {
                reason: format!("cannot send chat while {}", self.state),
            });
        };
        relay::check_size(&Message::chat(text.clone(), local_id.clone()))?;

        self.with_room(actions, |room, ctx| room.send_chat(ctx, text));
        Ok(())
    }

    fn end_room(&mut self, end: RoomEnd, actions: &mut Vec<SessionAction>) {
        self.teardown(actions);
        match end {
            RoomEnd::HostLeft { host } => {
                self.log(LogLevel::Warn, format!("host {host} left, room closed"), actions);
            },
            RoomEnd::RoomFull { host } => self.report(&SessionError::RoomFull { host }, actions),
        }
        self.transition(SessionState::Lobby, actions);
    }

    /// Close every link and drop the room, if any.
    fn teardown(&mut self, actions: &mut Vec<SessionAction>) {
        if let SessionState::Joining { host } = &self.state {
            actions.push(SessionAction::CloseLink { peer: host.clone() });
        }
        if self.with_room(actions, |room, ctx| room.leave(ctx)).is_some() {
            self.room = None;
            actions.push(SessionAction::RosterChanged { roster: Vec::new() });
        }
    }

    fn with_room<R>(
        &mut self,
        actions: &mut Vec<SessionAction>,
        f: impl FnOnce(&mut dyn RoomStrategy<E::Instant>, &mut RoomContext<'_, E::Instant>) -> R,
    ) -> Option<R> {
        let now = self.env.now();
        let (Some(room), Some(local_id)) = (self.room.as_mut(), self.local_id.as_ref()) else {
            return None;
        };
        let mut ctx =
            RoomContext { local_id, now, links: &mut self.links, actions, events: &mut self.events };
        Some(f(room.as_mut(), &mut ctx))
    }

    fn check_not_errored(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Errored { .. } => Err(SessionError::Errored),
            _ => Ok(()),
        }
    }

    fn transition(&mut self, state: SessionState, actions: &mut Vec<SessionAction>) {
        if self.state != state {
            self.state = state.clone();
            actions.push(SessionAction::StateChanged { state });
        }
    }

    fn report(&mut self, error: &SessionError, actions: &mut Vec<SessionAction>) {
        self.log(error.severity(), error.to_string(), actions);
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>, actions: &mut Vec<SessionAction>) {
        let message = message.into();
        self.events.push(level, message.clone());
        actions.push(SessionAction::Log { level, message });
    }
}
