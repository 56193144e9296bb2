//! Collector configuration.
//!
//! Deserializable settings covering rate limiting, circuit breaking,
//! collection limits, and per-provider overrides. Every field has a default
//! so an empty document yields a working configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::registry::{AdaptiveConfig, CircuitBreakerConfig};

/// Top-level collector configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub rate_limiting: RateLimitSettings,
    pub circuit_breaker: BreakerSettings,
    pub collection: CollectionSettings,
    /// Per-provider overrides keyed by provider id (e.g. "FINNHUB").
    pub providers: HashMap<String, ProviderSettings>,
}

impl CollectorConfig {
    /// Settings for a provider, falling back to defaults when absent.
    pub fn provider_settings(&self, provider: &str) -> ProviderSettings {
        self.providers
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }
}

/// Global rate limiting knobs.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// When false, only fixed per-provider base delays are enforced.
    pub enable_adaptive_rate_limiting: bool,
    /// Delay multiplier applied on each throttle signal.
    pub backoff_multiplier: f64,
    /// Ceiling on the adaptive delay, in seconds.
    pub max_rate_limit_delay_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enable_adaptive_rate_limiting: true,
            backoff_multiplier: 2.0,
            max_rate_limit_delay_secs: 30,
        }
    }
}

impl RateLimitSettings {
    pub fn adaptive_config(&self) -> AdaptiveConfig {
        AdaptiveConfig {
            enabled: self.enable_adaptive_rate_limiting,
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_secs(self.max_rate_limit_delay_secs),
            ..Default::default()
        }
    }
}

/// Circuit breaker knobs.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures before a provider's circuit opens.
    pub failure_threshold: u32,
    /// Seconds to wait before trying a tripped provider again.
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

impl BreakerSettings {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
        }
    }
}

/// Collection-wide limits.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    /// Symbol lists longer than this are truncated with a warning.
    pub max_symbols_per_collection: usize,
    /// Deadline for one collection run, checked between providers.
    pub collection_timeout_minutes: u64,
    /// Winner/loser list length in the collection result.
    pub top_movers: usize,
    /// Consecutive per-symbol failures that abandon a provider's batch.
    pub max_consecutive_errors: u32,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            max_symbols_per_collection: 100,
            collection_timeout_minutes: 30,
            top_movers: 5,
            max_consecutive_errors: 5,
        }
    }
}

impl CollectionSettings {
    pub fn collection_timeout(&self) -> Duration {
        Duration::from_secs(self.collection_timeout_minutes * 60)
    }
}

/// Per-provider overrides.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base inter-call delay in milliseconds. When absent, the provider's
    /// own declared call budget is used.
    pub rate_limit_delay_ms: Option<u64>,
    /// Symbols per batch chunk.
    pub batch_size: usize,
    /// Pause between batch chunks, in milliseconds.
    pub batch_delay_ms: u64,
    /// Retries after the initial attempt for one symbol.
    pub max_retries: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: None,
            batch_size: 10,
            batch_delay_ms: 2000,
            max_retries: 3,
        }
    }
}

impl ProviderSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Option<Duration> {
        self.rate_limit_delay_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config: CollectorConfig = serde_json::from_str("{}").unwrap();

        assert!(config.rate_limiting.enable_adaptive_rate_limiting);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.collection.top_movers, 5);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_partial_override() {
        let config: CollectorConfig = serde_json::from_str(
            r#"{
                "circuit_breaker": { "failure_threshold": 3 },
                "providers": {
                    "ALPHA_VANTAGE": { "batch_size": 5, "rate_limit_delay_ms": 13000 }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        // Unspecified fields keep their defaults
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 60);

        let av = config.provider_settings("ALPHA_VANTAGE");
        assert_eq!(av.batch_size, 5);
        assert_eq!(av.rate_limit_delay(), Some(Duration::from_secs(13)));
        assert_eq!(av.max_retries, 3);

        // Unknown provider falls back entirely to defaults
        let other = config.provider_settings("FINNHUB");
        assert_eq!(other.batch_size, 10);
        assert!(other.rate_limit_delay().is_none());
    }

    #[test]
    fn test_duration_conversions() {
        let settings = CollectionSettings {
            collection_timeout_minutes: 2,
            ..Default::default()
        };
        assert_eq!(settings.collection_timeout(), Duration::from_secs(120));

        let breaker = BreakerSettings::default();
        assert_eq!(
            breaker.breaker_config().recovery_timeout,
            Duration::from_secs(60)
        );
    }
}
