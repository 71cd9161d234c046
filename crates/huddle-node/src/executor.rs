//! Write policy for link IO.
//!
//! A relay turns into one independent write per link. The policy decides
//! what a link's writer does when one of those writes fails.

use std::time::Duration;

/// Policy for handling per-link write failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastPolicy {
    /// Report the failure and stop writing to that link. Other links are
    /// unaffected.
    #[default]
    BestEffort,

    /// Retry failed writes with exponential backoff before giving up.
    Retry {
        /// Maximum number of retry attempts
        max_attempts: u32,
        /// Initial backoff duration in milliseconds
        initial_backoff_ms: u64,
    },
}

impl BroadcastPolicy {
    /// Backoff before retry `attempt` (zero-based), or `None` once the policy
    /// gives up.
    pub fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::BestEffort => None,
            Self::Retry { max_attempts, initial_backoff_ms } => {
                if attempt >= max_attempts {
                    return None;
                }
                let factor = 1u64.checked_shl(attempt.min(20)).unwrap_or(u64::MAX);
                Some(Duration::from_millis(initial_backoff_ms.saturating_mul(factor)))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_policy_default() {
        let policy = BroadcastPolicy::default();
        assert_eq!(policy, BroadcastPolicy::BestEffort);
        assert_eq!(policy.retry_delay(0), None);
    }

    #[test]
    fn retry_backs_off_then_gives_up() {
        let policy = BroadcastPolicy::Retry { max_attempts: 3, initial_backoff_ms: 100 };

        assert_eq!(policy.retry_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.retry_delay(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.retry_delay(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.retry_delay(3), None);
    }
}
