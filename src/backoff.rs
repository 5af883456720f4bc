//! Reconnect backoff schedule.

use std::time::Duration;

/// Delay before the first reconnect attempt; doubles on each further attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);

/// Upper bound on any single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Failed reconnect attempts tolerated before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential reconnect schedule without jitter.
///
/// Retry `n` (1-based) waits `min(base_delay * 2^(n-1), max_delay)`. With
/// the defaults that is 1s, 2s, 4s, 8s, 10s.
///
/// # Example
///
/// ```
/// use party_room_client::backoff::ReconnectPolicy;
/// use std::time::Duration;
///
/// let policy = ReconnectPolicy::new();
/// assert_eq!(policy.delay_for(3), Duration::from_secs(4));
/// assert_eq!(policy.delay_for(5), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set how many failed attempts are tolerated. Zero disables reconnection.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1_u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_then_caps() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (1..=5).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10000]);
    }

    #[test]
    fn large_attempts_stay_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(64), DEFAULT_MAX_DELAY);
        assert_eq!(policy.delay_for(u32::MAX), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn custom_schedule() {
        let policy = ReconnectPolicy::new()
            .with_base_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_millis(600))
            .with_max_attempts(3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(600));
        assert_eq!(policy.max_attempts, 3);
    }
}
