//! Per-key retry backoff for failed reconciles

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Error;

const BASE_DELAY: Duration = Duration::from_secs(5);
const MAX_DELAY: Duration = Duration::from_secs(300);
const CONFLICT_DELAY: Duration = Duration::from_secs(1);

/// Tracks consecutive failures per MessageRequest and turns them into a
/// retry delay that doubles on each failure.
#[derive(Debug, Default)]
pub struct RetryBackoff {
    failures: Mutex<HashMap<String, u32>>,
}

impl RetryBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_delay(&self, key: &str, error: &Error) -> Duration {
        // A conflict means someone else just wrote the object; the fresh
        // version is already on its way through the watch.
        if error.is_conflict() {
            return CONFLICT_DELAY;
        }
        if !error.is_retryable() {
            return MAX_DELAY;
        }

        let attempt = match self.failures.lock() {
            Ok(mut failures) => {
                let count = failures.entry(key.to_string()).or_insert(0);
                *count = count.saturating_add(1);
                *count
            }
            Err(_) => 1,
        };

        delay_for_attempt(attempt)
    }

    /// Forget failures for `key` after a successful reconcile
    pub fn reset(&self, key: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(key);
        }
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.failures
            .lock()
            .ok()
            .and_then(|failures| failures.get(key).copied())
            .unwrap_or(0)
    }
}

fn delay_for_attempt(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    BASE_DELAY
        .checked_mul(1u32 << exponent)
        .unwrap_or(MAX_DELAY)
        .min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let backoff = RetryBackoff::new();
        let err = Error::not_found("pod default/sender-a");

        assert_eq!(backoff.next_delay("default/a", &err), Duration::from_secs(5));
        assert_eq!(backoff.next_delay("default/a", &err), Duration::from_secs(10));
        assert_eq!(backoff.next_delay("default/a", &err), Duration::from_secs(20));
        for _ in 0..10 {
            backoff.next_delay("default/a", &err);
        }
        assert_eq!(backoff.next_delay("default/a", &err), MAX_DELAY);
    }

    #[test]
    fn keys_are_independent_and_reset() {
        let backoff = RetryBackoff::new();
        let err = Error::Cancelled;

        backoff.next_delay("default/a", &err);
        backoff.next_delay("default/a", &err);
        assert_eq!(backoff.next_delay("other/a", &err), BASE_DELAY);
        assert_eq!(backoff.failures("default/a"), 2);

        backoff.reset("default/a");
        assert_eq!(backoff.failures("default/a"), 0);
        assert_eq!(backoff.next_delay("default/a", &err), BASE_DELAY);
    }

    #[test]
    fn conflicts_retry_quickly_without_counting() {
        let backoff = RetryBackoff::new();
        let err = Error::conflict("messagerequest default/a");

        assert_eq!(backoff.next_delay("default/a", &err), CONFLICT_DELAY);
        assert_eq!(backoff.failures("default/a"), 0);
    }

    #[test]
    fn invalid_resources_wait_longest() {
        let backoff = RetryBackoff::new();
        assert_eq!(
            backoff.next_delay("default/a", &Error::invalid("no namespace")),
            MAX_DELAY
        );
    }
}
