//! Provider fallback chain.
//!
//! Tries providers in priority order until one produces a viable dataset.
//! Every provider call runs through the shared resilience components
//! (circuit breaker, adaptive rate limiter, retry policy, validator), and
//! provider-level outcomes distinguish "no data" from definitive failures:
//! once two distinct providers report definitive errors in one run, the
//! remaining providers are left untouched and the run fails fast. Total
//! exhaustion is resolved by the [`DegradationPolicy`].

mod degradation;
mod diagnostics;

pub use degradation::DegradationPolicy;
pub use diagnostics::{AttemptOutcome, ChainDiagnostics, ProviderAttempt, SkipReason};

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::batch::{BatchOptions, BatchOrchestrator, GuardedFetch};
use crate::config::CollectorConfig;
use crate::enrich::{self, EnrichmentSource};
use crate::errors::{ErrorCategory, RecoveryManager};
use crate::models::{CollectionResult, ProviderId, Symbol};
use crate::provider::SnapshotProvider;
use crate::registry::{
    AdaptiveRateLimiter, CircuitBreaker, PacingConfig, RecordValidator, RetryPolicy,
};

/// Records required for a provider's dataset to count as viable, bounded by
/// the requested symbol count for small runs.
const MIN_VIABLE_RECORDS: usize = 5;

/// Distinct providers with definitive failures that abort the run.
const CRITICAL_PROVIDER_LIMIT: usize = 2;

/// Backoff base for per-symbol retries.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Priority-ordered provider chain sharing one set of resilience components.
pub struct ProviderChain {
    providers: Vec<Arc<dyn SnapshotProvider>>,
    limiter: Arc<AdaptiveRateLimiter>,
    breaker: Arc<CircuitBreaker>,
    validator: Arc<RecordValidator>,
    recovery: Arc<RecoveryManager>,
    enrichers: Vec<Arc<dyn EnrichmentSource>>,
    /// Overrides the providers' declared priorities, keyed by provider id.
    custom_priorities: HashMap<String, u8>,
    config: CollectorConfig,
}

impl ProviderChain {
    /// Build a chain over `providers` with shared components derived from
    /// `config`. Each provider's pacing starts from its declared call budget
    /// unless the configuration overrides it.
    pub fn new(providers: Vec<Arc<dyn SnapshotProvider>>, config: CollectorConfig) -> Self {
        let limiter = Arc::new(AdaptiveRateLimiter::with_config(
            config.rate_limiting.adaptive_config(),
        ));
        let breaker = Arc::new(CircuitBreaker::with_config(
            config.circuit_breaker.breaker_config(),
        ));

        for provider in &providers {
            let provider_id: ProviderId = Cow::Borrowed(provider.id());
            let base_delay = config
                .provider_settings(provider.id())
                .rate_limit_delay()
                .unwrap_or(provider.budget().base_delay);
            limiter.configure(&provider_id, PacingConfig { base_delay });
        }

        Self {
            providers,
            limiter,
            breaker,
            validator: Arc::new(RecordValidator::new()),
            recovery: Arc::new(RecoveryManager::new()),
            enrichers: Vec::new(),
            custom_priorities: HashMap::new(),
            config,
        }
    }

    /// Attach best-effort enrichment sources.
    pub fn with_enrichment(mut self, sources: Vec<Arc<dyn EnrichmentSource>>) -> Self {
        self.enrichers = sources;
        self
    }

    /// Override provider ordering. Lower values win; providers without an
    /// entry keep their declared priority.
    pub fn with_custom_priorities(mut self, priorities: HashMap<String, u8>) -> Self {
        self.custom_priorities = priorities;
        self
    }

    /// The shared circuit breaker, for introspection and manual resets.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The shared recovery manager's rolling error statistics.
    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    /// Collect a unified dataset for `symbols`.
    ///
    /// Tries providers in priority order; the first provider yielding a
    /// viable record set wins and stamps the result's `data_source`. In
    /// production mode total failure returns a labeled failed result; in
    /// non-production mode a deterministic placeholder dataset is
    /// substituted instead.
    pub async fn collect(&self, symbols: &[Symbol], production_mode: bool) -> CollectionResult {
        let mut symbols = symbols.to_vec();
        let max_symbols = self.config.collection.max_symbols_per_collection;
        if symbols.len() > max_symbols {
            warn!(
                "Chain: truncating symbol list from {} to {}",
                symbols.len(),
                max_symbols
            );
            symbols.truncate(max_symbols);
        }

        let deadline = Instant::now() + self.config.collection.collection_timeout();
        let min_viable = MIN_VIABLE_RECORDS.min(symbols.len()).max(1);

        let mut diagnostics = ChainDiagnostics::new();
        let mut critical_errors: Vec<String> = Vec::new();
        let mut critical_providers: HashSet<&'static str> = HashSet::new();
        let mut failures: Vec<String> = Vec::new();

        for provider in self.ordered_providers() {
            let provider_id: ProviderId = Cow::Borrowed(provider.id());

            if Instant::now() >= deadline {
                warn!(
                    "Chain: collection deadline passed before '{}'",
                    provider.id()
                );
                diagnostics.record_skip(provider.id(), SkipReason::DeadlineExceeded);
                failures.push(format!("{}: deadline exceeded", provider.id()));
                continue;
            }

            if self.breaker.is_session_disabled(&provider_id) {
                info!("Chain: skipping '{}' (disabled for session)", provider.id());
                diagnostics.record_skip(provider.id(), SkipReason::SessionDisabled);
                continue;
            }

            if !self.breaker.is_allowed(&provider_id) {
                info!("Chain: skipping '{}' (circuit open)", provider.id());
                diagnostics.record_skip(provider.id(), SkipReason::CircuitOpen);
                continue;
            }

            let settings = self.config.provider_settings(provider.id());
            let guarded = GuardedFetch::new(
                provider.clone(),
                self.limiter.clone(),
                self.breaker.clone(),
                self.validator.clone(),
                self.recovery.clone(),
                RetryPolicy::new(settings.max_retries, RETRY_BASE_DELAY),
            );
            let orchestrator = BatchOrchestrator::new(BatchOptions {
                batch_size: settings.batch_size,
                batch_delay: settings.batch_delay(),
                max_consecutive_errors: self.config.collection.max_consecutive_errors,
            });

            info!(
                "Chain: trying '{}' for {} symbols",
                provider.id(),
                symbols.len()
            );
            let report = orchestrator.run(&symbols, |s| guarded.fetch(s)).await;

            if report.records.len() >= min_viable {
                info!(
                    "Chain: '{}' produced {} records ({} failed)",
                    provider.id(),
                    report.records.len(),
                    report.failed
                );
                diagnostics.record_success(provider.id(), report.records.len());
                info!("Chain run: {}", diagnostics.summary());

                let mut result = CollectionResult::from_records(
                    report.records,
                    provider.id(),
                    self.config.collection.top_movers,
                );
                result.critical_errors = critical_errors;
                if let Some(enrichment) = enrich::gather(&self.enrichers).await {
                    result.enrichment = enrichment;
                }
                return result;
            }

            let message = match (&report.definitive_error, &report.last_error) {
                (Some(error), _) => error.to_string(),
                (None, Some(error)) => error.to_string(),
                (None, None) => format!(
                    "only {} of {} symbols yielded records",
                    report.records.len(),
                    report.attempted
                ),
            };
            warn!("Chain: '{}' not viable: {}", provider.id(), message);
            diagnostics.record_failure(provider.id(), &message);
            failures.push(format!("{}: {}", provider.id(), message));

            // Escalate on any definitive failure during the batch, even when
            // a later generic failure was the one that ended the run.
            if let Some(definitive) = &report.definitive_error {
                critical_errors.push(format!("{}: {}", provider.id(), definitive));
                critical_providers.insert(provider.id());

                // Bad credentials cannot heal within this process, so
                // calling the provider again would only burn quota.
                if definitive.category() == ErrorCategory::Authentication {
                    self.breaker.disable_for_session(&provider_id);
                }

                if critical_providers.len() >= CRITICAL_PROVIDER_LIMIT {
                    error!(
                        "Chain: aborting run after definitive failures from {} providers",
                        critical_providers.len()
                    );
                    info!("Chain run: {}", diagnostics.summary());
                    return CollectionResult::failed(
                        format!(
                            "aborted after definitive failures from {} providers: {}",
                            critical_providers.len(),
                            failures.join("; ")
                        ),
                        critical_errors,
                    );
                }
            }
        }

        info!("Chain run: {}", diagnostics.summary());

        let error = if failures.is_empty() {
            "no providers available".to_string()
        } else {
            format!("all providers exhausted: {}", failures.join("; "))
        };

        DegradationPolicy::new(self.config.collection.top_movers).resolve(
            production_mode,
            error,
            critical_errors,
        )
    }

    /// Providers ordered by custom priority, then declared priority. Stable,
    /// so equal-priority providers keep their registration order.
    fn ordered_providers(&self) -> Vec<Arc<dyn SnapshotProvider>> {
        let mut ordered = self.providers.clone();
        ordered.sort_by_key(|p| {
            self.custom_priorities
                .get(p.id())
                .copied()
                .unwrap_or_else(|| p.priority())
        });
        ordered
    }
}
