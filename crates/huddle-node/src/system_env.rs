//! Production Environment implementation using system time and RNG.

use std::time::Duration;

use huddle_core::Environment;

/// Production environment using tokio time and OS randomness.
///
/// Time comes from `tokio::time::Instant` so that deadlines computed by the
/// session line up with the runtime's timers.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Nothing in the session depends on these bytes being secret.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
