//! Link registry.
//!
//! Tracks the open point-to-point links of one session, keyed by remote
//! identifier. On a host there is one entry per admitted client; on a client
//! there is exactly one, to the host. Rejected candidates and links still
//! waiting to open are never registered, so a relay can only reach admitted
//! peers.
//!
//! Iteration order is by identifier, which keeps fan-out deterministic under
//! simulation.

use std::collections::BTreeMap;

use huddle_proto::PeerId;

/// Which side opened the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    /// Remote opened it (host side).
    Inbound,
    /// We opened it (client side).
    Outbound,
}

/// Per-link bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Which side opened the link.
    pub direction: LinkDirection,
    /// Messages queued for sending on this link.
    pub messages_sent: u64,
    /// Messages received on this link.
    pub messages_received: u64,
}

/// Open links of a session.
#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    links: BTreeMap<PeerId, LinkInfo>,
}

impl LinkRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open link. Returns false if `peer` already had one, in
    /// which case the existing entry is kept.
    pub fn insert(&mut self, peer: PeerId, direction: LinkDirection) -> bool {
        if self.links.contains_key(&peer) {
            return false;
        }
        self.links.insert(peer, LinkInfo { direction, messages_sent: 0, messages_received: 0 });
        true
    }

    /// Unregister a link.
    pub fn remove(&mut self, peer: &PeerId) -> Option<LinkInfo> {
        self.links.remove(peer)
    }

    /// Unregister every link, returning their identifiers.
    pub fn drain(&mut self) -> Vec<PeerId> {
        std::mem::take(&mut self.links).into_keys().collect()
    }

    /// True if a link to `peer` is registered.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.links.contains_key(peer)
    }

    /// Bookkeeping for `peer`.
    pub fn get(&self, peer: &PeerId) -> Option<&LinkInfo> {
        self.links.get(peer)
    }

    /// Registered identifiers.
    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.links.keys()
    }

    /// Number of registered links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True if no link is registered.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub(crate) fn record_sent(&mut self, peer: &PeerId) {
        if let Some(info) = self.links.get_mut(peer) {
            info.messages_sent += 1;
        }
    }

    pub(crate) fn record_received(&mut self, peer: &PeerId) {
        if let Some(info) = self.links.get_mut(peer) {
            info.messages_received += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_unique_per_peer() {
        let mut links = LinkRegistry::new();
        assert!(links.insert(PeerId::from("a"), LinkDirection::Inbound));
        assert!(!links.insert(PeerId::from("a"), LinkDirection::Outbound));

        assert_eq!(links.len(), 1);
        assert_eq!(links.get(&PeerId::from("a")).map(|i| i.direction), Some(LinkDirection::Inbound));
    }

    #[test]
    fn drain_empties_registry() {
        let mut links = LinkRegistry::new();
        links.insert(PeerId::from("b"), LinkDirection::Inbound);
        links.insert(PeerId::from("a"), LinkDirection::Inbound);

        assert_eq!(links.drain(), vec![PeerId::from("a"), PeerId::from("b")]);
        assert!(links.is_empty());
    }

    #[test]
    fn counters_ignore_unknown_peers() {
        let mut links = LinkRegistry::new();
        links.insert(PeerId::from("a"), LinkDirection::Inbound);

        links.record_sent(&PeerId::from("a"));
        links.record_sent(&PeerId::from("ghost"));
        links.record_received(&PeerId::from("a"));

        let info = links.get(&PeerId::from("a")).cloned();
        assert_eq!(info.map(|i| (i.messages_sent, i.messages_received)), Some((1, 1)));
    }
}
