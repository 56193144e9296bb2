//! Bounded exponential-backoff retry for a single logical call.
//!
//! The retry policy governs one call; the circuit breaker governs behavior
//! across many calls over time. The two are orthogonal and composed by the
//! provider chain.

use std::future::Future;
use std::time::Duration;

use log::debug;
use rand::Rng;

use crate::errors::{CollectError, ErrorCategory, RecoveryAction};
use crate::models::ProviderId;

use super::rate_limiter::AdaptiveRateLimiter;

/// Default number of retries after the initial attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base for the exponential backoff schedule.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Retry policy for one fallible call.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff base: attempt `n` sleeps `base_delay * 2^n` plus jitter.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Execute `op`, retrying transient failures with exponential backoff.
    ///
    /// Rate-limit-flavored failures are reported to the limiter so the
    /// provider's pacing inflates before the next attempt. Failures whose
    /// recovery action is `Skip` or `ManualIntervention` (validation,
    /// authentication) propagate immediately: retrying cannot succeed.
    /// After exhaustion the last failure propagates.
    pub async fn run<T, F, Fut>(
        &self,
        provider: &ProviderId,
        limiter: &AdaptiveRateLimiter,
        op: F,
    ) -> Result<T, CollectError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CollectError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if error.category() == ErrorCategory::RateLimit {
                        limiter.record_throttle(provider, &error.to_string());
                    }

                    let retryable = matches!(
                        error.recovery_action(),
                        RecoveryAction::Retry | RecoveryAction::BackoffRetry
                    );

                    if !retryable || attempt >= self.max_retries {
                        return Err(error);
                    }

                    let backoff = self.backoff_for(attempt);
                    debug!(
                        "Retry: attempt {}/{} for '{}' failed ({}), sleeping {:?}",
                        attempt + 1,
                        self.max_retries,
                        provider,
                        error,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// `base_delay * 2^attempt` plus up to 25% random jitter.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_max = (exp / 4).max(Duration::from_millis(1));
        let jitter = Duration::from_micros(
            rand::thread_rng().gen_range(0..=jitter_max.as_micros() as u64),
        );
        exp + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_success_needs_no_retry() {
        let limiter = AdaptiveRateLimiter::new();
        let provider: ProviderId = Cow::Borrowed("TEST");
        let calls = AtomicUsize::new(0);

        let result: Result<u32, CollectError> = policy()
            .run(&provider, &limiter, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_until_exhaustion() {
        let limiter = AdaptiveRateLimiter::new();
        let provider: ProviderId = Cow::Borrowed("TEST");
        let calls = AtomicUsize::new(0);

        let result: Result<u32, CollectError> = policy()
            .run(&provider, &limiter, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(CollectError::Timeout {
                        provider: "TEST".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(CollectError::Timeout { .. })));
        // Initial attempt plus 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_eventual_success() {
        let limiter = AdaptiveRateLimiter::new();
        let provider: ProviderId = Cow::Borrowed("TEST");
        let calls = AtomicUsize::new(0);

        let result: Result<u32, CollectError> = policy()
            .run(&provider, &limiter, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CollectError::Timeout {
                            provider: "TEST".to_string(),
                        })
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_authentication_not_retried() {
        let limiter = AdaptiveRateLimiter::new();
        let provider: ProviderId = Cow::Borrowed("TEST");
        let calls = AtomicUsize::new(0);

        let result: Result<u32, CollectError> = policy()
            .run(&provider, &limiter, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(CollectError::AuthenticationFailed {
                        provider: "TEST".to_string(),
                        message: "Invalid API key".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(CollectError::AuthenticationFailed { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation_not_retried() {
        let limiter = AdaptiveRateLimiter::new();
        let provider: ProviderId = Cow::Borrowed("TEST");
        let calls = AtomicUsize::new(0);

        let result: Result<u32, CollectError> = policy()
            .run(&provider, &limiter, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(CollectError::ValidationFailed {
                        message: "negative price".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(CollectError::ValidationFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_failure_notifies_limiter() {
        let limiter = AdaptiveRateLimiter::new();
        let provider: ProviderId = Cow::Borrowed("TEST");
        let before = limiter.current_delay(&provider);

        let _: Result<u32, CollectError> = policy()
            .run(&provider, &limiter, || async {
                Err(CollectError::RateLimited {
                    provider: "TEST".to_string(),
                })
            })
            .await;

        assert!(limiter.current_delay(&provider) > before);
    }
}
