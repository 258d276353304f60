//! Capped exponential backoff for repeatedly failing calls.
//!
//! Polling already retries naturally on the next cycle; this tracker only
//! suppresses a call key after consecutive failures so an outage does not
//! hammer the broker. After `n` consecutive failures a key is suppressed for
//! `min(base * 2^(n-1), cap)`. Any success clears the key.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    /// Policy that never suppresses.
    pub const DISABLED: Self = Self {
        base: Duration::ZERO,
        cap: Duration::ZERO,
    };

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.base.is_zero()
    }

    /// Suppression delay after `consecutive` failures.
    #[must_use]
    pub fn delay(&self, consecutive: u32) -> Duration {
        if !self.is_enabled() || consecutive == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(consecutive - 1).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    consecutive: u32,
    until: Instant,
}

/// Per-key failure tracker shared by the engine and the monitor task.
#[derive(Debug, Default)]
pub struct FailureBackoff {
    policy: BackoffPolicy,
    entries: DashMap<String, Entry>,
}

impl FailureBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    /// `Err(remaining)` while `key` is suppressed.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        match self.entries.get(key) {
            Some(entry) => {
                let now = Instant::now();
                if entry.until > now {
                    Err(entry.until - now)
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    pub fn record_success(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Record a failure and return the new suppression delay.
    pub fn record_failure(&self, key: &str) -> Duration {
        if !self.policy.is_enabled() {
            return Duration::ZERO;
        }
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            consecutive: 0,
            until: Instant::now(),
        });
        entry.consecutive = entry.consecutive.saturating_add(1);
        let delay = self.policy.delay(entry.consecutive);
        entry.until = Instant::now() + delay;
        delay
    }

    #[must_use]
    pub fn consecutive_failures(&self, key: &str) -> u32 {
        self.entries.get(key).map(|e| e.consecutive).unwrap_or(0)
    }

    /// Forget every key (called at Daily Reset).
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(30),
        };
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_secs(5));
        assert_eq!(policy.delay(2), Duration::from_secs(10));
        assert_eq!(policy.delay(3), Duration::from_secs(20));
        assert_eq!(policy.delay(4), Duration::from_secs(30));
        assert_eq!(policy.delay(40), Duration::from_secs(30));
    }

    #[test]
    fn test_disabled_policy_never_suppresses() {
        let backoff = FailureBackoff::new(BackoffPolicy::DISABLED);
        backoff.record_failure("quote:005930");
        assert!(backoff.check("quote:005930").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppression_expires() {
        let backoff = FailureBackoff::new(BackoffPolicy::default());
        backoff.record_failure("quote:005930");
        assert!(backoff.check("quote:005930").is_err());
        assert!(backoff.check("quote:000660").is_ok());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(backoff.check("quote:005930").is_ok());
        assert_eq!(backoff.consecutive_failures("quote:005930"), 1);

        backoff.record_success("quote:005930");
        assert_eq!(backoff.consecutive_failures("quote:005930"), 0);
    }
}
