use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay between reconnect attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    #[default]
    Exponential,
}

/// Bounded reconnection policy for the push channel.
///
/// After `max_attempts` consecutive failed connects following the first one,
/// the session gives up and waits for an explicit `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let shift = retry.saturating_sub(1).min(20);
                self.base_delay.saturating_mul(1 << shift)
            }
        };
        delay.min(self.max_delay.max(self.base_delay))
    }

    /// Delay before the next attempt after `failures` consecutive failed
    /// connects, or `None` once the budget is spent.
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        (failures <= self.max_attempts).then(|| self.delay_for_retry(failures.max(1)))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            5,
            Duration::from_millis(1_000),
            Duration::from_millis(5_000),
            Backoff::Exponential,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_base_delay() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(1_000));
    }

    #[test]
    fn doubles_until_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for_retry(4), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for_retry(40), Duration::from_millis(5_000));
    }

    #[test]
    fn fixed_backoff_never_grows() {
        let policy = ReconnectPolicy {
            backoff: Backoff::Fixed,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for_retry(5), Duration::from_millis(1_000));
    }

    #[test]
    fn budget_is_bounded() {
        let policy = ReconnectPolicy::default();
        assert!(policy.next_delay(5).is_some());
        assert_eq!(policy.next_delay(6), None);

        let no_retry = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        assert_eq!(no_retry.next_delay(1), None);
        // A dropped connection (zero failures) is always retried.
        assert!(no_retry.next_delay(0).is_some());
    }
}
