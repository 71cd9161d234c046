//! Node runtime configuration.

use std::time::Duration;

use huddle_core::RoomConfig;

use crate::executor::BroadcastPolicy;

/// Reconnect backoff for the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound on the delay between retries.
    pub max: Duration,
}

impl Backoff {
    /// Delay before retry number `attempt` (zero-based), doubling each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self { initial: Duration::from_millis(250), max: Duration::from_secs(10) }
    }
}

/// Runtime configuration for a [`Node`](crate::Node).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the TCP directory listens on. The listen address is the
    /// node's identifier, so it must be reachable by other participants.
    pub bind_address: String,
    /// Room limits and timing.
    pub room: RoomConfig,
    /// Directory reconnect backoff.
    pub reconnect: Backoff,
    /// How per-link write failures are handled.
    pub broadcast_policy: BroadcastPolicy,
    /// Capacity of the node event channel.
    pub event_buffer: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            room: RoomConfig::default(),
            reconnect: Backoff::default(),
            broadcast_policy: BroadcastPolicy::default(),
            event_buffer: 256,
        }
    }
}
