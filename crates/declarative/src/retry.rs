//! Retry logic with exponential backoff for transient provider errors.

use crate::error::ProviderError;
use std::thread;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Outcome of a retried call and how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, ProviderError>,
    pub attempts: u32,
}

/// Execute a provider call with retry logic.
///
/// Only transient and throttled errors are retried; anything else is
/// returned after the first attempt. `label` names the call in log output.
pub fn with_retry<T, F>(config: &RetryConfig, label: &str, mut operation: F) -> Attempted<T>
where
    F: FnMut() -> Result<T, ProviderError>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation() {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = config.delay_for_attempt(attempt - 1);
                log::warn!(
                    "{label}: attempt {attempt}/{max_attempts} failed: {e}. Retrying in {}ms",
                    delay.as_millis()
                );
                thread::sleep(delay);
            }
            Err(e) => {
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(10),
        }
    }

    fn timeout() -> ProviderError {
        ProviderError::Transient {
            message: "timeout".to_string(),
        }
    }

    #[test]
    fn test_default_backoff() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(800));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_success_first_try() {
        let outcome = with_retry(&RetryConfig::no_retry(), "op", || Ok(42));
        assert_eq!(outcome.result.unwrap(), 42);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_non_retryable_error_stops_immediately() {
        let calls = Cell::new(0);
        let outcome: Attempted<()> = with_retry(&fast(3), "op", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::Invalid {
                message: "bad cidr".to_string(),
            })
        });
        assert!(outcome.result.is_err());
        assert_eq!(calls.get(), 1);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_eventual_success() {
        let calls = Cell::new(0);
        let outcome = with_retry(&fast(3), "op", || {
            let current = calls.get();
            calls.set(current + 1);
            if current < 2 { Err(timeout()) } else { Ok(7) }
        });
        assert_eq!(outcome.result.unwrap(), 7);
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_all_attempts_fail() {
        let calls = Cell::new(0);
        let outcome: Attempted<()> = with_retry(&fast(3), "op", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::Throttled {
                message: "slow down".to_string(),
            })
        });
        assert!(matches!(outcome.result, Err(ProviderError::Throttled { .. })));
        assert_eq!(calls.get(), 3);
        assert_eq!(outcome.attempts, 3);
    }
}
