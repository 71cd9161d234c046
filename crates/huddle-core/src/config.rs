//! Room configuration.

use std::time::Duration;

/// Default room capacity, host included.
pub const MAX_PARTICIPANTS: usize = 6;

/// Default delay between sending `room-full` and closing the rejected link.
pub const REJECTION_GRACE: Duration = Duration::from_millis(500);

/// Default number of entries kept in the session event log.
pub const EVENT_LOG_CAPACITY: usize = 256;

/// Room limits and timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Maximum roster size, host included. A candidate arriving when the
    /// roster already holds this many participants is rejected.
    pub max_participants: usize,
    /// Time a rejected candidate gets to receive `room-full` before its link
    /// is closed.
    pub rejection_grace: Duration,
    /// Bounded size of the observable event log.
    pub event_log_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_participants: MAX_PARTICIPANTS,
            rejection_grace: REJECTION_GRACE,
            event_log_capacity: EVENT_LOG_CAPACITY,
        }
    }
}
