//! Per-provider resilience primitives.
//!
//! This module holds the shared registry of per-provider state:
//! - Adaptive pacing between calls (rate limiter)
//! - Circuit breaking for fault isolation
//! - Bounded retry for a single call
//! - Record validation
//!
//! One instance of each component is created by the provider chain and
//! shared by every caller; per-provider entries live in locked maps keyed
//! by provider name, so sharing is explicit and independently testable.

mod circuit_breaker;
mod rate_limiter;
mod retry;
mod validator;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};
pub use rate_limiter::{AdaptiveConfig, AdaptiveRateLimiter, PacingConfig};
pub use retry::RetryPolicy;
pub use validator::{RecordValidator, ValidationSeverity, ValidatorConfig};
