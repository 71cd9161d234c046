//! Relay engine.
//!
//! Host-side fan-out. A relay turns one message into one
//! [`SessionAction::Send`] per registered link, skipping the excluded peer.
//! Each send is executed independently by the driver, so a link that closed
//! a moment ago costs one failed send and nothing else.

use huddle_proto::{MAX_PAYLOAD_SIZE, Message, PeerId, encode};

use crate::{error::SessionError, event::SessionAction, link::LinkRegistry};

/// Fail if `message` does not encode into a single frame.
pub fn check_size(message: &Message) -> Result<(), SessionError> {
    let size = encode(message)
        .map_err(|e| SessionError::InvalidState { reason: format!("cannot encode: {e}") })?
        .len();
    if size > MAX_PAYLOAD_SIZE {
        return Err(SessionError::MessageTooLarge {
            kind: message.kind(),
            size,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(())
}

/// Send `message` to every registered link except `exclude`.
pub fn relay(
    links: &mut LinkRegistry,
    message: &Message,
    exclude: Option<&PeerId>,
    actions: &mut Vec<SessionAction>,
) {
    let targets: Vec<PeerId> =
        links.peers().filter(|peer| Some(*peer) != exclude).cloned().collect();

    for peer in targets {
        links.record_sent(&peer);
        actions.push(SessionAction::Send { to: peer, message: message.clone() });
    }
}

/// Send `message` on the registered link to `to`.
///
/// Returns false, without queueing anything, if no such link exists.
pub fn send(
    links: &mut LinkRegistry,
    to: &PeerId,
    message: Message,
    actions: &mut Vec<SessionAction>,
) -> bool {
    if !links.contains(to) {
        return false;
    }
    links.record_sent(to);
    actions.push(SessionAction::Send { to: to.clone(), message });
    true
}
