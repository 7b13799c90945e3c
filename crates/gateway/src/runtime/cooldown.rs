//! Per-owner cooldown used to bound background LLM spend.
//!
//! State is process-local and resets on restart; it is a cost limiter,
//! not a correctness guarantee.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Allows one acquisition per key per `cooldown`.
pub struct CooldownLimiter {
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    last: Mutex<HashMap<String, Instant>>,
}

impl CooldownLimiter {
    pub fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown,
            clock,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_system_clock(cooldown: Duration) -> Self {
        Self::new(cooldown, Arc::new(SystemClock))
    }

    /// Record an acquisition for `key` and return true, unless the last one
    /// is younger than the cooldown.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut last = self.last.lock();
        if let Some(prev) = last.get(key) {
            if now.saturating_duration_since(*prev) < self.cooldown {
                return false;
            }
        }
        last.insert(key.to_string(), now);
        true
    }

    /// Time left before `key` may acquire again.
    pub fn remaining(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let last = self.last.lock();
        let prev = last.get(key)?;
        self.cooldown
            .checked_sub(now.saturating_duration_since(*prev))
            .filter(|d| !d.is_zero())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A clock that only moves when told to.
    pub(crate) struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        pub(crate) fn advance(&self, by: Duration) {
            *self.now.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock()
        }
    }

    #[test]
    fn second_acquire_inside_window_is_refused() {
        let clock = Arc::new(ManualClock::new());
        let limiter = CooldownLimiter::new(Duration::from_secs(300), clock.clone());

        assert!(limiter.try_acquire("owner-1"));
        assert!(!limiter.try_acquire("owner-1"));
        assert!(limiter.try_acquire("owner-2"));

        clock.advance(Duration::from_secs(299));
        assert!(!limiter.try_acquire("owner-1"));
        assert_eq!(limiter.remaining("owner-1"), Some(Duration::from_secs(1)));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire("owner-1"));
    }

    #[test]
    fn unknown_key_has_no_remaining_time() {
        let limiter = CooldownLimiter::with_system_clock(Duration::from_secs(60));
        assert!(limiter.remaining("nobody").is_none());
    }
}
