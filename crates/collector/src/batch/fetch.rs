//! Single-symbol fetch with the full resilience pipeline applied.

use std::borrow::Cow;
use std::sync::Arc;

use crate::errors::{CollectError, RecoveryManager};
use crate::models::{ProviderId, Symbol, UnifiedRecord};
use crate::provider::SnapshotProvider;
use crate::registry::{AdaptiveRateLimiter, CircuitBreaker, RecordValidator, RetryPolicy};

/// One provider wrapped in the shared resilience components.
///
/// Every call goes breaker check -> rate limiter wait -> retried fetch ->
/// validation, and the outcome feeds back into the breaker. Validation
/// failures are skipped without a breaker penalty: bad data is not a
/// provider outage.
pub struct GuardedFetch {
    provider: Arc<dyn SnapshotProvider>,
    limiter: Arc<AdaptiveRateLimiter>,
    breaker: Arc<CircuitBreaker>,
    validator: Arc<RecordValidator>,
    recovery: Arc<RecoveryManager>,
    retry: RetryPolicy,
}

impl GuardedFetch {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        limiter: Arc<AdaptiveRateLimiter>,
        breaker: Arc<CircuitBreaker>,
        validator: Arc<RecordValidator>,
        recovery: Arc<RecoveryManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            limiter,
            breaker,
            validator,
            recovery,
            retry,
        }
    }

    /// The wrapped provider's identifier.
    pub fn provider_id(&self) -> &'static str {
        self.provider.id()
    }

    /// Fetch one symbol through the full pipeline.
    pub async fn fetch(&self, symbol: Symbol) -> Result<UnifiedRecord, CollectError> {
        let provider_id: ProviderId = Cow::Borrowed(self.provider.id());

        if !self.breaker.is_allowed(&provider_id) {
            return Err(CollectError::CircuitOpen {
                provider: provider_id.to_string(),
            });
        }

        self.limiter.wait(&provider_id).await;

        let result = self
            .retry
            .run(&provider_id, &self.limiter, || {
                self.provider.fetch_snapshot(&symbol)
            })
            .await;

        match result {
            Ok(record) => match self.validator.validate(&record) {
                Ok(()) => {
                    self.breaker.record_success(&provider_id);
                    Ok(record)
                }
                Err(error) => {
                    self.recovery.handle(
                        self.provider.id(),
                        format!("validate '{}'", symbol),
                        &error.to_string(),
                    );
                    Err(error)
                }
            },
            Err(error) => {
                self.recovery.handle(
                    self.provider.id(),
                    format!("fetch '{}'", symbol),
                    &error.to_string(),
                );
                if error.counts_toward_circuit() {
                    self.breaker.record_failure(&provider_id);
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::provider::CallBudget;
    use crate::registry::{CircuitBreakerConfig, CircuitState};

    struct MockProvider {
        calls: AtomicUsize,
        outcome: MockOutcome,
    }

    enum MockOutcome {
        Success,
        AuthFailure,
        BadRecord,
    }

    impl MockProvider {
        fn new(outcome: MockOutcome) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome,
            }
        }
    }

    #[async_trait]
    impl SnapshotProvider for MockProvider {
        fn id(&self) -> &'static str {
            "MOCK"
        }

        fn budget(&self) -> CallBudget {
            CallBudget {
                base_delay: Duration::ZERO,
                ..Default::default()
            }
        }

        async fn fetch_snapshot(&self, symbol: &str) -> Result<UnifiedRecord, CollectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                MockOutcome::Success => Ok(UnifiedRecord::new(symbol, dec!(50), dec!(1), "MOCK")),
                MockOutcome::AuthFailure => Err(CollectError::AuthenticationFailed {
                    provider: "MOCK".to_string(),
                    message: "Invalid API key".to_string(),
                }),
                MockOutcome::BadRecord => {
                    Ok(UnifiedRecord::new(symbol, dec!(-1), dec!(0), "MOCK"))
                }
            }
        }
    }

    fn guarded(provider: Arc<MockProvider>, breaker: Arc<CircuitBreaker>) -> GuardedFetch {
        GuardedFetch::new(
            provider,
            Arc::new(AdaptiveRateLimiter::new()),
            breaker,
            Arc::new(RecordValidator::new()),
            Arc::new(RecoveryManager::new()),
            RetryPolicy::new(0, Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_success_records_breaker_success() {
        let provider = Arc::new(MockProvider::new(MockOutcome::Success));
        let breaker = Arc::new(CircuitBreaker::new());
        let fetch = guarded(provider.clone(), breaker.clone());

        let record = fetch.fetch("AAPL".to_string()).await.unwrap();
        assert_eq!(record.symbol, "AAPL");

        let id: ProviderId = Cow::Borrowed("MOCK");
        assert_eq!(breaker.failure_count(&id), 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits_without_calling_provider() {
        let provider = Arc::new(MockProvider::new(MockOutcome::Success));
        let breaker = Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
        }));
        let id: ProviderId = Cow::Borrowed("MOCK");
        breaker.record_failure(&id);
        assert_eq!(breaker.state(&id), CircuitState::Open);

        let fetch = guarded(provider.clone(), breaker);
        let result = fetch.fetch("AAPL".to_string()).await;

        assert!(matches!(result, Err(CollectError::CircuitOpen { .. })));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_counts_toward_circuit() {
        let provider = Arc::new(MockProvider::new(MockOutcome::AuthFailure));
        let breaker = Arc::new(CircuitBreaker::new());
        let fetch = guarded(provider, breaker.clone());

        let result = fetch.fetch("AAPL".to_string()).await;
        assert!(matches!(
            result,
            Err(CollectError::AuthenticationFailed { .. })
        ));

        let id: ProviderId = Cow::Borrowed("MOCK");
        assert_eq!(breaker.failure_count(&id), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_breaker_penalty() {
        let provider = Arc::new(MockProvider::new(MockOutcome::BadRecord));
        let breaker = Arc::new(CircuitBreaker::new());
        let fetch = guarded(provider, breaker.clone());

        let result = fetch.fetch("AAPL".to_string()).await;
        assert!(matches!(result, Err(CollectError::ValidationFailed { .. })));

        // Bad data is not a provider outage
        let id: ProviderId = Cow::Borrowed("MOCK");
        assert_eq!(breaker.failure_count(&id), 0);
    }
}
