//! Role strategies.
//!
//! A session in a room delegates every room-scoped event to a
//! [`RoomStrategy`]. There are exactly two:
//!
//! - [`HostRelayStrategy`]: owns the [`RosterManager`], admits candidates,
//!   stamps and relays chat.
//! - [`ClientForwardStrategy`]: forwards chat to the host and applies the
//!   host's snapshots and deltas to a replica roster.
//!
//! Strategies borrow the session's link registry, action buffer and event
//! log through a [`RoomContext`] for the duration of one event.

use std::collections::BTreeSet;

use huddle_proto::{Message, PeerId, Role};

use crate::{
    config::RoomConfig,
    env::Timestamp,
    error::SessionError,
    event::SessionAction,
    event_log::{EventLog, LogLevel},
    link::{LinkDirection, LinkRegistry},
    relay,
    roster::{Admission, Roster, RosterManager},
};

/// Session-owned state lent to a strategy for one event.
#[derive(Debug)]
pub struct RoomContext<'a, I> {
    /// Local identifier.
    pub local_id: &'a PeerId,
    /// Time at which the event is processed.
    pub now: I,
    /// Open links.
    pub links: &'a mut LinkRegistry,
    /// Output buffer.
    pub actions: &'a mut Vec<SessionAction>,
    /// Observable event log.
    pub events: &'a mut EventLog,
}

impl<I> RoomContext<'_, I> {
    /// Record a log line and emit it to the driver.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.events.push(level, message.clone());
        self.actions.push(SessionAction::Log { level, message });
    }

    /// Record an error at its own severity.
    pub fn report(&mut self, error: &SessionError) {
        self.log(error.severity(), error.to_string());
    }
}

/// Why a room ended without a local leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEnd {
    /// The link to the host closed.
    HostLeft {
        /// The departed host.
        host: PeerId,
    },
    /// The host rejected the join for capacity.
    RoomFull {
        /// The rejecting host.
        host: PeerId,
    },
}

/// Result of a room-scoped event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomOutcome {
    /// Still in the room.
    Continue,
    /// The room is over for the local participant.
    Ended(RoomEnd),
}

/// Role-specific room behavior.
pub trait RoomStrategy<I: Timestamp>: std::fmt::Debug + Send {
    /// Role tag.
    fn role(&self) -> Role;

    /// Local view of the roster.
    fn roster(&self) -> &Roster;

    /// A remote endpoint started opening a link to us.
    fn incoming_link(&mut self, ctx: &mut RoomContext<'_, I>, peer: PeerId);

    /// A link reached the open state.
    fn link_opened(&mut self, ctx: &mut RoomContext<'_, I>, peer: PeerId);

    /// A link closed.
    fn link_closed(&mut self, ctx: &mut RoomContext<'_, I>, peer: &PeerId) -> RoomOutcome;

    /// A decoded message arrived on the link to `from`.
    fn message_received(
        &mut self,
        ctx: &mut RoomContext<'_, I>,
        from: &PeerId,
        message: Message,
    ) -> RoomOutcome;

    /// Local chat intent.
    fn send_chat(&mut self, ctx: &mut RoomContext<'_, I>, text: String);

    /// Timer wakeup.
    fn tick(&mut self, ctx: &mut RoomContext<'_, I>);

    /// Earliest pending deadline.
    fn next_deadline(&self) -> Option<I>;

    /// The directory assigned a new local identifier.
    fn local_id_changed(&mut self, ctx: &mut RoomContext<'_, I>, new_id: &PeerId);

    /// Tear the room down: close every link and clear the roster.
    fn leave(&mut self, ctx: &mut RoomContext<'_, I>);
}

/// Host side: authoritative roster and relay.
#[derive(Debug)]
pub struct HostRelayStrategy<I: Timestamp> {
    manager: RosterManager<I>,
    candidates: BTreeSet<PeerId>,
}

impl<I: Timestamp> HostRelayStrategy<I> {
    /// Room seeded with `host`.
    pub fn new(host: PeerId, config: RoomConfig) -> Self {
        Self { manager: RosterManager::new(host, config), candidates: BTreeSet::new() }
    }

    fn is_known(&self, links: &LinkRegistry, peer: &PeerId) -> bool {
        self.candidates.contains(peer)
            || links.contains(peer)
            || self.manager.is_pending(peer)
            || self.manager.roster().contains(peer)
    }
}

impl<I: Timestamp> RoomStrategy<I> for HostRelayStrategy<I> {
    fn role(&self) -> Role {
        Role::Host
    }

    fn roster(&self) -> &Roster {
        self.manager.roster()
    }

    fn incoming_link(&mut self, ctx: &mut RoomContext<'_, I>, peer: PeerId) {
        if self.is_known(ctx.links, &peer) {
            ctx.log(LogLevel::Warn, format!("ignoring second inbound link from {peer}"));
            return;
        }
        ctx.log(LogLevel::Debug, format!("inbound link from {peer}"));
        self.candidates.insert(peer);
    }

    fn link_opened(&mut self, ctx: &mut RoomContext<'_, I>, peer: PeerId) {
        if ctx.links.contains(&peer) {
            ctx.log(LogLevel::Warn, format!("ignoring repeated open from member {peer}"));
            return;
        }
        if !self.candidates.remove(&peer) {
            ctx.log(LogLevel::Warn, format!("link to {peer} opened without an inbound request"));
            ctx.actions.push(SessionAction::CloseLink { peer });
            return;
        }

        let label = peer.to_string();
        match self.manager.admit(ctx.links, peer, ctx.now, ctx.actions) {
            Admission::Admitted => {
                let size = self.manager.roster().len();
                ctx.log(LogLevel::Info, format!("{label} joined ({size} in room)"));
            },
            Admission::Rejected => {
                ctx.log(LogLevel::Info, format!("rejected {label}: room full"));
            },
            Admission::Duplicate => {
                ctx.log(LogLevel::Warn, format!("{label} is already in the room"));
            },
        }
    }

    fn link_closed(&mut self, ctx: &mut RoomContext<'_, I>, peer: &PeerId) -> RoomOutcome {
        if self.candidates.remove(peer) || self.manager.forget_pending(peer) {
            ctx.log(LogLevel::Debug, format!("candidate {peer} went away"));
            return RoomOutcome::Continue;
        }
        if self.manager.remove(ctx.links, peer, ctx.actions) {
            let size = self.manager.roster().len();
            ctx.log(LogLevel::Info, format!("{peer} left ({size} in room)"));
        }
        RoomOutcome::Continue
    }

    fn message_received(
        &mut self,
        ctx: &mut RoomContext<'_, I>,
        from: &PeerId,
        message: Message,
    ) -> RoomOutcome {
        if !ctx.links.contains(from) {
            ctx.log(LogLevel::Debug, format!("dropping {} from unadmitted {from}", message.kind()));
            return RoomOutcome::Continue;
        }
        ctx.links.record_received(from);

        match message {
            Message::Chat(chat) => {
                // Sender is whoever owns the link, not what the client claimed.
                let stamped = Message::chat(chat.text.clone(), from.clone());
                if let Err(error) = relay::check_size(&stamped) {
                    ctx.report(&error);
                    return RoomOutcome::Continue;
                }
                relay::relay(ctx.links, &stamped, Some(from), ctx.actions);
                ctx.actions.push(SessionAction::DeliverChat { sender: from.clone(), text: chat.text });
            },
            other => {
                ctx.report(&SessionError::UnexpectedMessage { from: from.clone(), kind: other.kind() });
            },
        }
        RoomOutcome::Continue
    }

    fn send_chat(&mut self, ctx: &mut RoomContext<'_, I>, text: String) {
        let message = Message::chat(text.clone(), ctx.local_id.clone());
        relay::relay(ctx.links, &message, None, ctx.actions);
        ctx.actions.push(SessionAction::DeliverChat { sender: ctx.local_id.clone(), text });
    }

    fn tick(&mut self, ctx: &mut RoomContext<'_, I>) {
        let closed = self.manager.expire(ctx.now, ctx.actions);
        if closed > 0 {
            ctx.log(LogLevel::Debug, format!("closed {closed} rejected link(s)"));
        }
    }

    fn next_deadline(&self) -> Option<I> {
        self.manager.next_deadline()
    }

    fn local_id_changed(&mut self, ctx: &mut RoomContext<'_, I>, new_id: &PeerId) {
        self.manager.rename_host(ctx.links, new_id.clone(), ctx.actions);
    }

    fn leave(&mut self, ctx: &mut RoomContext<'_, I>) {
        self.manager.close_all(ctx.links, ctx.actions);
        for peer in std::mem::take(&mut self.candidates) {
            ctx.actions.push(SessionAction::CloseLink { peer });
        }
    }
}

/// Client side: one link to the host and a replica roster.
#[derive(Debug)]
pub struct ClientForwardStrategy {
    host: PeerId,
    roster: Roster,
}

impl ClientForwardStrategy {
    /// Register the freshly opened link to `host`.
    ///
    /// The roster stays empty until the host's snapshot arrives.
    pub fn new(host: PeerId, links: &mut LinkRegistry) -> Self {
        links.insert(host.clone(), LinkDirection::Outbound);
        Self { host, roster: Roster::new() }
    }

    /// The room's host.
    pub fn host(&self) -> &PeerId {
        &self.host
    }

    fn apply(&mut self, ctx: &mut RoomContext<'_, impl Sized>, message: Message) -> RoomOutcome {
        let changed = match message {
            Message::Chat(chat) => {
                ctx.actions.push(SessionAction::DeliverChat { sender: chat.sender, text: chat.text });
                false
            },
            Message::RosterSnapshot(snapshot) => {
                self.roster = Roster::from_snapshot(snapshot.participants);
                true
            },
            Message::ParticipantJoined(participant) => self.roster.push(participant),
            Message::ParticipantLeft(left) => self.roster.remove(&left.identifier),
            Message::RoomFull(_) => {
                return RoomOutcome::Ended(RoomEnd::RoomFull { host: self.host.clone() });
            },
        };

        if changed {
            ctx.actions.push(SessionAction::RosterChanged { roster: self.roster.to_vec() });
        }
        RoomOutcome::Continue
    }
}

impl<I: Timestamp> RoomStrategy<I> for ClientForwardStrategy {
    fn role(&self) -> Role {
        Role::Client
    }

    fn roster(&self) -> &Roster {
        &self.roster
    }

    fn incoming_link(&mut self, ctx: &mut RoomContext<'_, I>, peer: PeerId) {
        if peer == self.host {
            ctx.log(LogLevel::Warn, format!("ignoring inbound link from host {peer}"));
            return;
        }
        ctx.log(LogLevel::Debug, format!("refusing inbound link from {peer}: not hosting"));
        ctx.actions.push(SessionAction::CloseLink { peer });
    }

    fn link_opened(&mut self, ctx: &mut RoomContext<'_, I>, peer: PeerId) {
        if peer == self.host {
            ctx.log(LogLevel::Warn, format!("ignoring repeated open from host {peer}"));
            return;
        }
        ctx.log(LogLevel::Warn, format!("unexpected link to {peer} while joined"));
        ctx.actions.push(SessionAction::CloseLink { peer });
    }

    fn link_closed(&mut self, ctx: &mut RoomContext<'_, I>, peer: &PeerId) -> RoomOutcome {
        if peer != &self.host {
            return RoomOutcome::Continue;
        }
        ctx.links.remove(peer);
        RoomOutcome::Ended(RoomEnd::HostLeft { host: self.host.clone() })
    }

    fn message_received(
        &mut self,
        ctx: &mut RoomContext<'_, I>,
        from: &PeerId,
        message: Message,
    ) -> RoomOutcome {
        if from != &self.host {
            ctx.log(LogLevel::Debug, format!("dropping {} from non-host {from}", message.kind()));
            return RoomOutcome::Continue;
        }
        ctx.links.record_received(from);
        self.apply(ctx, message)
    }

    fn send_chat(&mut self, ctx: &mut RoomContext<'_, I>, text: String) {
        let message = Message::chat(text.clone(), ctx.local_id.clone());
        relay::send(ctx.links, &self.host, message, ctx.actions);
        ctx.actions.push(SessionAction::DeliverChat { sender: ctx.local_id.clone(), text });
    }

    fn tick(&mut self, _ctx: &mut RoomContext<'_, I>) {}

    fn next_deadline(&self) -> Option<I> {
        None
    }

    fn local_id_changed(&mut self, _ctx: &mut RoomContext<'_, I>, _new_id: &PeerId) {}

    fn leave(&mut self, ctx: &mut RoomContext<'_, I>) {
        for peer in ctx.links.drain() {
            ctx.actions.push(SessionAction::CloseLink { peer });
        }
        self.roster = Roster::new();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use huddle_proto::{MAX_PAYLOAD_SIZE, Participant, encode};

    use super::*;

    struct Fixture {
        local_id: PeerId,
        links: LinkRegistry,
        actions: Vec<SessionAction>,
        log: EventLog,
        now: Instant,
    }

    impl Fixture {
        fn new(local_id: &str) -> Self {
            Self {
                local_id: PeerId::from(local_id),
                links: LinkRegistry::new(),
                actions: Vec::new(),
                log: EventLog::new(64),
                now: Instant::now(),
            }
        }

        fn ctx(&mut self) -> RoomContext<'_, Instant> {
            RoomContext {
                local_id: &self.local_id,
                now: self.now,
                links: &mut self.links,
                actions: &mut self.actions,
                events: &mut self.log,
            }
        }

        fn take(&mut self) -> Vec<SessionAction> {
            std::mem::take(&mut self.actions)
        }
    }

    fn peer(id: &str) -> PeerId {
        PeerId::from(id)
    }

    fn join(host: &mut HostRelayStrategy<Instant>, fx: &mut Fixture, id: &str) {
        host.incoming_link(&mut fx.ctx(), peer(id));
        host.link_opened(&mut fx.ctx(), peer(id));
    }

    fn sends(actions: &[SessionAction]) -> Vec<(&str, &Message)> {
        actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Send { to, message } => Some((to.as_str(), message)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn host_stamps_sender_and_excludes_origin() {
        let mut fx = Fixture::new("h");
        let mut host = HostRelayStrategy::new(peer("h"), RoomConfig::default());
        join(&mut host, &mut fx, "a");
        join(&mut host, &mut fx, "b");
        join(&mut host, &mut fx, "c");
        fx.take();

        let forged = Message::chat("hi", peer("mallory"));
        host.message_received(&mut fx.ctx(), &peer("a"), forged);

        let actions = fx.take();
        let out = sends(&actions);
        assert_eq!(out.len(), 2);
        for (to, message) in out {
            assert_ne!(to, "a");
            assert_eq!(message, &Message::chat("hi", peer("a")));
        }
        assert!(actions.contains(&SessionAction::DeliverChat { sender: peer("a"), text: "hi".into() }));
    }

    #[test]
    fn host_drops_chat_that_outgrows_frame_when_stamped() {
        let member = "a-much-longer-link-identifier:7000";
        let mut fx = Fixture::new("h");
        let mut host = HostRelayStrategy::new(peer("h"), RoomConfig::default());
        join(&mut host, &mut fx, member);
        join(&mut host, &mut fx, "b");
        fx.take();

        // Fits exactly under the short claimed sender.
        let mut text = "x".repeat(MAX_PAYLOAD_SIZE - 64);
        while encode(&Message::chat(text.clone(), peer("a"))).unwrap().len() < MAX_PAYLOAD_SIZE {
            text.push('x');
        }
        host.message_received(&mut fx.ctx(), &peer(member), Message::chat(text, peer("a")));

        let actions = fx.take();
        assert!(sends(&actions).is_empty());
        assert!(!actions.iter().any(|a| matches!(a, SessionAction::DeliverChat { .. })));
        assert!(actions.iter().any(|a| matches!(
            a,
            SessionAction::Log { level: LogLevel::Warn, message } if message.contains("frame limit")
        )));
    }

    #[test]
    fn host_chat_is_echoed_locally_not_to_self() {
        let mut fx = Fixture::new("h");
        let mut host = HostRelayStrategy::new(peer("h"), RoomConfig::default());
        join(&mut host, &mut fx, "a");
        fx.take();

        host.send_chat(&mut fx.ctx(), "hello".into());

        let actions = fx.take();
        assert_eq!(sends(&actions), vec![("a", &Message::chat("hello", peer("h")))]);
        assert!(actions.contains(&SessionAction::DeliverChat { sender: peer("h"), text: "hello".into() }));
    }

    #[test]
    fn host_drops_roster_messages_from_clients() {
        let mut fx = Fixture::new("h");
        let mut host = HostRelayStrategy::new(peer("h"), RoomConfig::default());
        join(&mut host, &mut fx, "a");
        join(&mut host, &mut fx, "b");
        fx.take();

        let forged = Message::participant_left(peer("b"));
        host.message_received(&mut fx.ctx(), &peer("a"), forged);

        let actions = fx.take();
        assert!(sends(&actions).is_empty());
        assert_eq!(host.roster().len(), 3);
        assert_eq!(fx.log.last().map(|e| e.level), Some(LogLevel::Warn));
    }

    #[test]
    fn host_refuses_link_without_inbound_request() {
        let mut fx = Fixture::new("h");
        let mut host = HostRelayStrategy::new(peer("h"), RoomConfig::default());

        host.link_opened(&mut fx.ctx(), peer("x"));

        assert_eq!(fx.take().last(), Some(&SessionAction::CloseLink { peer: peer("x") }));
        assert_eq!(host.roster().len(), 1);
    }

    #[test]
    fn repeated_open_keeps_member_link() {
        let mut fx = Fixture::new("h");
        let mut host = HostRelayStrategy::new(peer("h"), RoomConfig::default());
        join(&mut host, &mut fx, "a");
        fx.take();

        host.link_opened(&mut fx.ctx(), peer("a"));

        assert!(!fx.take().contains(&SessionAction::CloseLink { peer: peer("a") }));
        assert!(fx.links.contains(&peer("a")));
        assert_eq!(host.roster().len(), 2);
    }

    #[test]
    fn parked_candidate_never_receives_relays() {
        let mut fx = Fixture::new("h");
        let config = RoomConfig { max_participants: 2, ..RoomConfig::default() };
        let mut host = HostRelayStrategy::new(peer("h"), config);
        join(&mut host, &mut fx, "a");
        join(&mut host, &mut fx, "b");
        fx.take();

        host.send_chat(&mut fx.ctx(), "x".into());

        let actions = fx.take();
        assert_eq!(sends(&actions).iter().map(|(to, _)| *to).collect::<Vec<_>>(), ["a"]);
        assert!(host.next_deadline().is_some());

        fx.now += Duration::from_secs(1);
        host.tick(&mut fx.ctx());
        assert!(fx.take().contains(&SessionAction::CloseLink { peer: peer("b") }));
        assert!(host.next_deadline().is_none());
    }

    #[test]
    fn host_leave_closes_everything() {
        let mut fx = Fixture::new("h");
        let mut host = HostRelayStrategy::new(peer("h"), RoomConfig::default());
        join(&mut host, &mut fx, "a");
        host.incoming_link(&mut fx.ctx(), peer("b"));
        fx.take();

        host.leave(&mut fx.ctx());

        let actions = fx.take();
        assert!(actions.contains(&SessionAction::CloseLink { peer: peer("a") }));
        assert!(actions.contains(&SessionAction::CloseLink { peer: peer("b") }));
        assert!(fx.links.is_empty());
    }

    #[test]
    fn client_applies_snapshot_and_deltas() {
        let mut fx = Fixture::new("a");
        let mut client = ClientForwardStrategy::new(peer("h"), &mut fx.links);
        let from = peer("h");

        let snapshot = Message::roster_snapshot(vec![
            Participant::host(peer("h")),
            Participant::client(peer("a")),
        ]);
        RoomStrategy::<Instant>::message_received(&mut client, &mut fx.ctx(), &from, snapshot);
        let joined = Message::ParticipantJoined(Participant::client(peer("b")));
        RoomStrategy::<Instant>::message_received(&mut client, &mut fx.ctx(), &from, joined);
        let left = Message::participant_left(peer("a"));
        RoomStrategy::<Instant>::message_received(&mut client, &mut fx.ctx(), &from, left);

        let ids: Vec<_> = RoomStrategy::<Instant>::roster(&client).identifiers().cloned().collect();
        assert_eq!(ids, vec![peer("h"), peer("b")]);
    }

    #[test]
    fn client_ignores_messages_from_non_host() {
        let mut fx = Fixture::new("a");
        let mut client = ClientForwardStrategy::new(peer("h"), &mut fx.links);

        let outcome = RoomStrategy::<Instant>::message_received(
            &mut client,
            &mut fx.ctx(),
            &peer("b"),
            Message::RoomFull(huddle_proto::RoomFull {}),
        );

        assert_eq!(outcome, RoomOutcome::Continue);
    }

    #[test]
    fn client_room_ends_on_room_full_and_host_close() {
        let mut fx = Fixture::new("a");
        let mut client = ClientForwardStrategy::new(peer("h"), &mut fx.links);

        let outcome = RoomStrategy::<Instant>::message_received(
            &mut client,
            &mut fx.ctx(),
            &peer("h"),
            Message::RoomFull(huddle_proto::RoomFull {}),
        );
        assert_eq!(outcome, RoomOutcome::Ended(RoomEnd::RoomFull { host: peer("h") }));

        let outcome = RoomStrategy::<Instant>::link_closed(&mut client, &mut fx.ctx(), &peer("h"));
        assert_eq!(outcome, RoomOutcome::Ended(RoomEnd::HostLeft { host: peer("h") }));
        assert!(fx.links.is_empty());
    }

    #[test]
    fn client_chat_goes_to_host_only() {
        let mut fx = Fixture::new("a");
        let mut client = ClientForwardStrategy::new(peer("h"), &mut fx.links);

        RoomStrategy::<Instant>::send_chat(&mut client, &mut fx.ctx(), "hi".into());

        let actions = fx.take();
        assert_eq!(sends(&actions), vec![("h", &Message::chat("hi", peer("a")))]);
    }
}
