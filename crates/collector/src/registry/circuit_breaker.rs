//! Per-provider circuit breaker for failure isolation.
//!
//! The circuit has three states:
//!
//! - **Closed**: Normal operation, calls are allowed through.
//! - **Open**: Provider is failing, calls are rejected immediately.
//! - **HalfOpen**: One trial call is allowed to test recovery.
//!
//! A provider can additionally be disabled for the rest of the session:
//! that is simply the Open state with an unbounded recovery window, which
//! replaces ad hoc "skip this provider" booleans.
//!
//! State is in-memory only and resets on process restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::models::ProviderId;

/// Default number of consecutive failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    /// Normal operation - calls are allowed.
    Closed,
    /// Provider is failing - calls are rejected.
    Open,
    /// Testing recovery - one trial call allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Internal circuit state for a single provider.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Consecutive failures since the last success.
    failure_count: u32,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    /// Open with no recovery window - skipped until process restart.
    session_disabled: bool,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_success: None,
            session_disabled: false,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait before allowing a recovery trial call.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
        }
    }
}

/// Per-provider circuit breaker.
///
/// Thread-safe; one instance is shared by every caller and entries are
/// created lazily per provider name. Providers only contend on the brief
/// map access, never on each other's calls.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default settings.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    ///
    /// Slightly stale circuit state is preferable to panicking.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Check if calls are allowed for a provider.
    ///
    /// Returns true while Closed or HalfOpen. While Open, also handles the
    /// Open -> HalfOpen transition once the recovery timeout has elapsed;
    /// session-disabled circuits never transition.
    pub fn is_allowed(&self, provider: &ProviderId) -> bool {
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if circuit.session_disabled {
                    return false;
                }

                if let Some(last_failure) = circuit.last_failure {
                    if last_failure.elapsed() >= self.config.recovery_timeout {
                        info!(
                            "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                            provider
                        );
                        circuit.state = CircuitState::HalfOpen;
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Record a successful call for a provider.
    ///
    /// In Closed state resets the failure count; in HalfOpen the trial
    /// success closes the circuit.
    pub fn record_success(&self, provider: &ProviderId) {
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        circuit.last_success = Some(Instant::now());

        match circuit.state {
            CircuitState::Closed => {
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker: closing circuit for '{}' after trial success", provider);
                circuit.state = CircuitState::Closed;
                circuit.failure_count = 0;
                circuit.last_failure = None;
            }
            CircuitState::Open => {
                // is_allowed should have transitioned to HalfOpen first
                debug!(
                    "Circuit breaker: unexpected success for '{}' in Open state",
                    provider
                );
            }
        }
    }

    /// Record a failed call for a provider.
    ///
    /// Increments the consecutive failure count and may open the circuit.
    /// In HalfOpen state, the trial failure immediately reopens it.
    pub fn record_failure(&self, provider: &ProviderId) {
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        circuit.failure_count += 1;
        circuit.last_failure = Some(Instant::now());

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} consecutive failures",
                        provider, circuit.failure_count
                    );
                    circuit.state = CircuitState::Open;
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        provider, circuit.failure_count, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after trial failure",
                    provider
                );
                circuit.state = CircuitState::Open;
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    provider
                );
            }
        }
    }

    /// Open the circuit for the remainder of the session.
    ///
    /// The provider is skipped until process restart or a manual
    /// [`reset`](Self::reset). Used after repeated definitive failures where
    /// further calls would only burn quota.
    pub fn disable_for_session(&self, provider: &ProviderId) {
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        warn!("Circuit breaker: disabling '{}' for this session", provider);
        circuit.state = CircuitState::Open;
        circuit.session_disabled = true;
        circuit.last_failure = Some(Instant::now());
    }

    /// Whether the provider has been disabled for the session.
    pub fn is_session_disabled(&self, provider: &ProviderId) -> bool {
        let circuits = self.lock_circuits();
        circuits
            .get(provider.as_ref())
            .map(|c| c.session_disabled)
            .unwrap_or(false)
    }

    /// Get the current state for a provider.
    pub fn state(&self, provider: &ProviderId) -> CircuitState {
        let circuits = self.lock_circuits();
        circuits
            .get(provider.as_ref())
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Get the consecutive failure count for a provider.
    pub fn failure_count(&self, provider: &ProviderId) -> u32 {
        let circuits = self.lock_circuits();
        circuits
            .get(provider.as_ref())
            .map(|c| c.failure_count)
            .unwrap_or(0)
    }

    /// Reset the circuit for a provider to Closed, clearing any session
    /// disable.
    pub fn reset(&self, provider: &ProviderId) {
        let mut circuits = self.lock_circuits();

        if let Some(circuit) = circuits.get_mut(provider.as_ref()) {
            info!("Circuit breaker: manually resetting circuit for '{}'", provider);
            circuit.state = CircuitState::Closed;
            circuit.failure_count = 0;
            circuit.last_failure = None;
            circuit.session_disabled = false;
        }
    }

    /// Reset all circuits to their initial state.
    pub fn reset_all(&self) {
        let mut circuits = self.lock_circuits();
        circuits.clear();
        info!("Circuit breaker: all circuits reset");
    }

    /// Get metrics for all tracked providers.
    pub fn metrics(&self) -> Vec<CircuitMetrics> {
        let circuits = self.lock_circuits();

        circuits
            .iter()
            .map(|(provider, circuit)| CircuitMetrics {
                provider: provider.clone(),
                state: circuit.state,
                failure_count: circuit.failure_count,
                last_failure: circuit.last_failure,
                last_success: circuit.last_success,
                session_disabled: circuit.session_disabled,
            })
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for a single circuit.
#[derive(Clone, Debug)]
pub struct CircuitMetrics {
    pub provider: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub last_success: Option<Instant>,
    pub session_disabled: bool,
}
