//! Timing configuration: connect grace delay and reconnect policy.

use std::time::Duration;

/// Deferral between `start` and the first connect attempt.
///
/// Absorbs duplicate initialization: a manager torn down inside this window
/// never opens a transport.
pub const DEFAULT_CONNECT_GRACE: Duration = Duration::from_millis(100);

/// Delay before re-attempting after an unclean close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// When to retry after an unclean close or a failed open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt, unlimited attempts.
    Fixed {
        /// Delay before each attempt
        delay: Duration,
    },

    /// Exponential backoff with a ceiling and an optional attempt limit.
    Backoff {
        /// Delay before the first attempt
        initial: Duration,
        /// Upper bound for any delay
        max: Duration,
        /// Growth factor between consecutive attempts
        multiplier: u32,
        /// Attempts allowed before giving up. `None` retries forever.
        max_attempts: Option<u32>,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed { delay: DEFAULT_RECONNECT_DELAY }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero-based, counted since the
    /// last successful open). `None` once the attempt limit is reached.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Fixed { delay } => Some(delay),
            Self::Backoff { initial, max, multiplier, max_attempts } => {
                if max_attempts.is_some_and(|limit| attempt >= limit) {
                    return None;
                }
                let factor = multiplier.max(1).saturating_pow(attempt);
                Some(initial.saturating_mul(factor).min(max))
            },
        }
    }
}

/// Connection manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Deferral before the first connect attempt
    pub connect_grace: Duration,
    /// Retry behaviour after unclean closes
    pub reconnect: ReconnectPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { connect_grace: DEFAULT_CONNECT_GRACE, reconnect: ReconnectPolicy::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_never_gives_up() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(3)));
        assert_eq!(policy.delay_for_attempt(10_000), Some(Duration::from_secs(3)));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = ReconnectPolicy::Backoff {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(5),
            multiplier: 2,
            max_attempts: None,
        };

        let delays: Vec<_> = (0..6).filter_map(|n| policy.delay_for_attempt(n)).collect();
        assert_eq!(delays, vec![
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ]);

        // Huge attempt counts saturate instead of overflowing
        assert_eq!(policy.delay_for_attempt(u32::MAX), Some(Duration::from_secs(5)));
    }

    #[test]
    fn backoff_respects_attempt_limit() {
        let policy = ReconnectPolicy::Backoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 3,
            max_attempts: Some(2),
        };

        assert!(policy.delay_for_attempt(0).is_some());
        assert!(policy.delay_for_attempt(1).is_some());
        assert_eq!(policy.delay_for_attempt(2), None);
    }

    #[test]
    fn default_config_matches_reference_timings() {
        let config = ManagerConfig::default();
        assert_eq!(config.connect_grace, Duration::from_millis(100));
        assert_eq!(config.reconnect, ReconnectPolicy::Fixed { delay: Duration::from_millis(3000) });
    }

    proptest::proptest! {
        #[test]
        fn backoff_delays_never_shrink_or_exceed_ceiling(
            initial_ms in 1u64..10_000,
            max_ms in 1u64..120_000,
            multiplier in 0u32..5,
            attempts in 1u32..64,
        ) {
            let max = Duration::from_millis(max_ms.max(initial_ms));
            let policy = ReconnectPolicy::Backoff {
                initial: Duration::from_millis(initial_ms),
                max,
                multiplier,
                max_attempts: None,
            };

            let mut previous = Duration::ZERO;
            for attempt in 0..attempts {
                let delay = policy.delay_for_attempt(attempt).unwrap();
                proptest::prop_assert!(delay >= previous);
                proptest::prop_assert!(delay <= max);
                previous = delay;
            }
        }
    }
}
