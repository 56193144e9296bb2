//! Adaptive per-provider rate limiter.
//!
//! Enforces a minimum inter-call spacing per provider and adapts it to
//! observed throttling: a rate-limit signal inflates the delay by a
//! configured multiplier (capped), and absent further signals the delay
//! relaxes back toward the provider's base delay.
//!
//! Callers sharing a provider serialize their "time since last call" check
//! through the provider's entry in one locked map: each `wait` reserves the
//! next send slot under the lock and sleeps outside it, so measured gaps
//! hold even under concurrency. State is process-lifetime only.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::Rng;

use crate::errors::{ErrorCategory, ErrorClassifier};
use crate::models::ProviderId;

/// Default minimum spacing between calls to one provider.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default multiplier applied on a throttle signal.
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default upper bound for the adaptive delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default per-call relaxation factor while no throttle signal is recent.
const DEFAULT_DECAY_FACTOR: f64 = 0.9;

/// Default trailing window: throttle signals older than this stop blocking
/// decay.
const DEFAULT_DECAY_WINDOW: Duration = Duration::from_secs(60);

/// Global adaptive behavior knobs, shared across providers.
#[derive(Clone, Debug)]
pub struct AdaptiveConfig {
    /// When false, only the fixed base delay is enforced.
    pub enabled: bool,
    /// Multiplier applied to the current delay on each throttle signal.
    pub backoff_multiplier: f64,
    /// Cap for the inflated delay.
    pub max_delay: Duration,
    /// Per-call relaxation factor toward the base delay.
    pub decay_factor: f64,
    /// Throttle signals older than this no longer suppress decay.
    pub decay_window: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            decay_factor: DEFAULT_DECAY_FACTOR,
            decay_window: DEFAULT_DECAY_WINDOW,
        }
    }
}

/// Per-provider pacing configuration.
#[derive(Clone, Debug)]
pub struct PacingConfig {
    /// Minimum spacing between calls in the absence of throttling.
    pub base_delay: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

/// Pacing state for a single provider.
#[derive(Debug)]
struct Pacing {
    base_delay: Duration,
    /// Invariant: base_delay <= current_delay <= max_delay.
    current_delay: Duration,
    /// Send slot reserved for the most recent caller.
    last_slot: Option<Instant>,
    last_throttle: Option<Instant>,
}

impl Pacing {
    fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            current_delay: base_delay,
            last_slot: None,
            last_throttle: None,
        }
    }
}

/// Adaptive rate limiter for multiple providers.
///
/// Thread-safe; pacing entries are created on demand with default settings
/// or pre-configured per provider via [`configure`](Self::configure).
pub struct AdaptiveRateLimiter {
    pacing: Mutex<HashMap<String, Pacing>>,
    configs: Mutex<HashMap<String, PacingConfig>>,
    adaptive: AdaptiveConfig,
}

impl AdaptiveRateLimiter {
    /// Create a limiter with default adaptive behavior.
    pub fn new() -> Self {
        Self::with_config(AdaptiveConfig::default())
    }

    /// Create a limiter with custom adaptive behavior.
    pub fn with_config(adaptive: AdaptiveConfig) -> Self {
        Self {
            pacing: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
            adaptive,
        }
    }

    /// Lock the pacing mutex, recovering from poison if necessary.
    ///
    /// Slightly incorrect pacing is preferable to panicking.
    fn lock_pacing(&self) -> MutexGuard<'_, HashMap<String, Pacing>> {
        self.pacing.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter pacing mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, PacingConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure pacing for a specific provider, resetting any existing
    /// state for it.
    pub fn configure(&self, provider: &ProviderId, config: PacingConfig) {
        let mut configs = self.lock_configs();
        configs.insert(provider.to_string(), config);
        drop(configs); // release before acquiring the pacing lock

        let mut pacing = self.lock_pacing();
        pacing.remove(provider.as_ref());
    }

    /// Wait until the provider's next send slot.
    ///
    /// The first call per provider has zero wait. Subsequent calls sleep
    /// until `current_delay` (plus a small random jitter) has elapsed since
    /// the previous caller's slot. Each call also applies delay decay when
    /// no throttle signal landed within the trailing window.
    pub async fn wait(&self, provider: &ProviderId) {
        let slot = {
            let mut pacing = self.lock_pacing();

            let entry = match pacing.get_mut(provider.as_ref()) {
                Some(e) => e,
                None => {
                    let base = self.base_delay_for(provider);
                    pacing
                        .entry(provider.to_string())
                        .or_insert_with(|| Pacing::new(base))
                }
            };

            self.apply_decay(entry);

            let now = Instant::now();
            let slot = match entry.last_slot {
                None => now,
                Some(last) => {
                    let jitter = jitter_for(entry.current_delay);
                    (last + entry.current_delay + jitter).max(now)
                }
            };
            entry.last_slot = Some(slot);
            slot
        };

        let now = Instant::now();
        if slot > now {
            let pause = slot - now;
            debug!("Rate limiter: waiting {:?} for provider '{}'", pause, provider);
            tokio::time::sleep(pause).await;
        }
    }

    /// Report an error observed while calling the provider.
    ///
    /// If the text matches a rate-limit pattern the provider's delay is
    /// inflated by the backoff multiplier, capped at the configured maximum.
    /// Other errors are ignored here.
    pub fn record_throttle(&self, provider: &ProviderId, error_text: &str) {
        if !self.adaptive.enabled {
            return;
        }

        if ErrorClassifier::classify_text(error_text) != ErrorCategory::RateLimit {
            return;
        }

        let mut pacing = self.lock_pacing();
        let base = self.base_delay_for(provider);
        let entry = pacing
            .entry(provider.to_string())
            .or_insert_with(|| Pacing::new(base));

        let inflated = entry
            .current_delay
            .mul_f64(self.adaptive.backoff_multiplier)
            .min(self.adaptive.max_delay);

        warn!(
            "Rate limiter: throttle signal from '{}', delay {:?} -> {:?}",
            provider, entry.current_delay, inflated
        );

        entry.current_delay = inflated;
        entry.last_throttle = Some(Instant::now());
    }

    /// Current adaptive delay for a provider (base delay if untracked).
    pub fn current_delay(&self, provider: &ProviderId) -> Duration {
        let pacing = self.lock_pacing();
        pacing
            .get(provider.as_ref())
            .map(|p| p.current_delay)
            .unwrap_or_else(|| self.base_delay_for(provider))
    }

    /// Drop pacing state for a provider.
    pub fn reset(&self, provider: &ProviderId) {
        let mut pacing = self.lock_pacing();
        pacing.remove(provider.as_ref());
    }

    /// Relax the delay toward base while no throttle signal is recent.
    /// Never decays below the base delay.
    fn apply_decay(&self, entry: &mut Pacing) {
        if !self.adaptive.enabled || entry.current_delay <= entry.base_delay {
            return;
        }

        let throttled_recently = entry
            .last_throttle
            .map(|t| t.elapsed() < self.adaptive.decay_window)
            .unwrap_or(false);

        if !throttled_recently {
            let decayed = entry.current_delay.mul_f64(self.adaptive.decay_factor);
            entry.current_delay = decayed.max(entry.base_delay);
        }
    }

    fn base_delay_for(&self, provider: &ProviderId) -> Duration {
        let configs = self.lock_configs();
        configs
            .get(provider.as_ref())
            .map(|c| c.base_delay)
            .unwrap_or(DEFAULT_BASE_DELAY)
    }
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Small random jitter so callers sharing a schedule don't burst together.
fn jitter_for(delay: Duration) -> Duration {
    let max_jitter = (delay / 10).max(Duration::from_millis(1));
    let micros = rand::thread_rng().gen_range(0..=max_jitter.as_micros() as u64);
    Duration::from_micros(micros)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn limiter_with(base_delay: Duration, adaptive: AdaptiveConfig) -> AdaptiveRateLimiter {
        let limiter = AdaptiveRateLimiter::with_config(adaptive);
        limiter.configure(&Cow::Borrowed("TEST"), PacingConfig { base_delay });
        limiter
    }

    #[tokio::test]
    async fn test_first_call_has_zero_wait() {
        let limiter = limiter_with(Duration::from_secs(5), AdaptiveConfig::default());
        let provider: ProviderId = Cow::Borrowed("TEST");

        let start = Instant::now();
        limiter.wait(&provider).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_back_to_back_waits_enforce_base_delay() {
        let base = Duration::from_millis(50);
        let limiter = limiter_with(base, AdaptiveConfig::default());
        let provider: ProviderId = Cow::Borrowed("TEST");

        limiter.wait(&provider).await;
        let start = Instant::now();
        limiter.wait(&provider).await;

        assert!(start.elapsed() >= base);
    }

    #[test]
    fn test_throttle_signal_inflates_delay() {
        let limiter = limiter_with(
            Duration::from_millis(100),
            AdaptiveConfig {
                backoff_multiplier: 2.0,
                ..Default::default()
            },
        );
        let provider: ProviderId = Cow::Borrowed("TEST");

        limiter.record_throttle(&provider, "HTTP 429 Too Many Requests");
        assert_eq!(limiter.current_delay(&provider), Duration::from_millis(200));

        limiter.record_throttle(&provider, "rate limit exceeded");
        assert_eq!(limiter.current_delay(&provider), Duration::from_millis(400));
    }

    #[test]
    fn test_non_throttle_errors_ignored() {
        let limiter = limiter_with(Duration::from_millis(100), AdaptiveConfig::default());
        let provider: ProviderId = Cow::Borrowed("TEST");

        limiter.record_throttle(&provider, "connection refused");
        assert_eq!(limiter.current_delay(&provider), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let limiter = limiter_with(
            Duration::from_millis(100),
            AdaptiveConfig {
                backoff_multiplier: 10.0,
                max_delay: Duration::from_millis(500),
                ..Default::default()
            },
        );
        let provider: ProviderId = Cow::Borrowed("TEST");

        limiter.record_throttle(&provider, "429");
        limiter.record_throttle(&provider, "429");
        assert_eq!(limiter.current_delay(&provider), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_decay_is_monotonic_and_bounded_below() {
        let base = Duration::from_millis(10);
        let limiter = limiter_with(
            base,
            AdaptiveConfig {
                backoff_multiplier: 8.0,
                decay_factor: 0.5,
                // Zero window so decay applies immediately after a throttle
                decay_window: Duration::ZERO,
                ..Default::default()
            },
        );
        let provider: ProviderId = Cow::Borrowed("TEST");

        limiter.record_throttle(&provider, "429");
        let inflated = limiter.current_delay(&provider);
        assert_eq!(inflated, Duration::from_millis(80));

        // Each wait decays the delay; it never drops below base
        let mut previous = inflated;
        for _ in 0..8 {
            limiter.wait(&provider).await;
            let current = limiter.current_delay(&provider);
            assert!(current <= previous);
            assert!(current >= base);
            previous = current;
        }
        assert_eq!(previous, base);
    }

    #[test]
    fn test_recent_throttle_suppresses_decay() {
        let limiter = limiter_with(
            Duration::from_millis(10),
            AdaptiveConfig {
                decay_window: Duration::from_secs(60),
                ..Default::default()
            },
        );
        let provider: ProviderId = Cow::Borrowed("TEST");

        limiter.record_throttle(&provider, "429");
        let inflated = limiter.current_delay(&provider);

        // Decay is applied inside wait(); simulate its bookkeeping directly
        let mut pacing = limiter.lock_pacing();
        let entry = pacing.get_mut("TEST").unwrap();
        limiter.apply_decay(entry);
        assert_eq!(entry.current_delay, inflated);
    }

    #[test]
    fn test_disabled_mode_never_inflates() {
        let limiter = limiter_with(
            Duration::from_millis(100),
            AdaptiveConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let provider: ProviderId = Cow::Borrowed("TEST");

        limiter.record_throttle(&provider, "429 too many requests");
        assert_eq!(limiter.current_delay(&provider), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_provider_isolation() {
        let limiter = AdaptiveRateLimiter::new();
        let provider_a: ProviderId = Cow::Borrowed("PROVIDER_A");
        let provider_b: ProviderId = Cow::Borrowed("PROVIDER_B");

        limiter.record_throttle(&provider_a, "429");
        assert!(limiter.current_delay(&provider_a) > limiter.current_delay(&provider_b));

        // B's first call is not delayed by A's pacing
        let start = Instant::now();
        limiter.wait(&provider_b).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
