//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the session state machine from system
//! resources (time, randomness). This enables:
//!
//! - Deterministic Simulation: the harness provides a virtual clock and seeded
//!   RNG, so a failing interleaving can be replayed exactly.
//!
//! - Production Runtime: the node driver uses real system resources without
//!   any change to the protocol logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::{
    fmt::Debug,
    ops::{Add, Sub},
    time::Duration,
};

/// Point in time as seen by an [`Environment`].
///
/// Blanket-implemented for anything that behaves like an instant, so
/// `std::time::Instant`, `tokio::time::Instant` and simulated instants all
/// qualify.
pub trait Timestamp:
    Copy + Ord + Debug + Send + Sync + 'static + Add<Duration, Output = Self> + Sub<Output = Duration>
{
}

impl<T> Timestamp for T where
    T: Copy
        + Ord
        + Debug
        + Send
        + Sync
        + 'static
        + Add<Duration, Output = T>
        + Sub<Output = Duration>
{
}

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. Minimal panics: methods are infallible except in exceptional
///    circumstances (OS entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type produced by [`Environment::now`].
    type Instant: Timestamp;

    /// Returns the current time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: subsequent calls must return times >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this. The session state machine never sleeps;
    /// it exposes deadlines instead.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Simulation implementations MUST be seeded so runs are reproducible.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
