//! Error types and classification for the collection layer.
//!
//! This module provides:
//! - [`CollectError`]: The main error enum for all collection operations
//! - [`ErrorCategory`], [`RecoveryAction`]: Taxonomy used to decide how an
//!   error is handled (retry, backoff, skip, escalate)
//! - [`RecoveryManager`]: Rolling classification history for observability

mod classify;

pub use classify::{
    ErrorCategory, ErrorClassifier, ErrorReport, RecoveryAction, RecoveryManager, RecoveryStats,
    Severity,
};

use thiserror::Error;

/// Errors that can occur during collection.
///
/// Each variant maps to an [`ErrorCategory`] via [`category`](Self::category),
/// which determines how the orchestration layers respond to it.
#[derive(Error, Debug)]
pub enum CollectError {
    /// The provider rate limited the request (HTTP 429 or quota text).
    /// Recovered locally via adaptive backoff and retry.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The request to the provider timed out.
    /// Retried with backoff; repeats count toward the circuit breaker.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider rejected our credentials (HTTP 401/403).
    /// Never retried - contributes to critical-error escalation.
    #[error("Authentication failed: {provider} - {message}")]
    AuthenticationFailed {
        /// The provider that rejected the request
        provider: String,
        /// The rejection message
        message: String,
    },

    /// The provider returned data that failed validation checks.
    /// The symbol is skipped; does not count toward the circuit breaker.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Description of the validation failure
        message: String,
    },

    /// The requested symbol was not known to the provider.
    /// The symbol is skipped, like a validation failure.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// A provider-specific error occurred.
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The circuit breaker is open for this provider.
    /// The call was rejected without executing.
    #[error("Circuit open: {provider}")]
    CircuitOpen {
        /// The provider with an open circuit
        provider: String,
    },

    /// No providers are configured or all are circuit-broken.
    #[error("No providers available")]
    NoProvidersAvailable,

    /// Every configured provider was tried and failed.
    #[error("All providers failed: {message}")]
    AllProvidersFailed {
        /// Aggregated per-provider failure summary
        message: String,
    },

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl CollectError {
    /// Returns the taxonomy category for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketbrief_collector::errors::{CollectError, ErrorCategory};
    ///
    /// let error = CollectError::RateLimited { provider: "FINNHUB".to_string() };
    /// assert_eq!(error.category(), ErrorCategory::RateLimit);
    ///
    /// let error = CollectError::ValidationFailed { message: "negative price".to_string() };
    /// assert_eq!(error.category(), ErrorCategory::Validation);
    /// ```
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. } => ErrorCategory::RateLimit,

            Self::Timeout { .. } | Self::Network(_) => ErrorCategory::Network,

            Self::AuthenticationFailed { .. } => ErrorCategory::Authentication,

            Self::ValidationFailed { .. } | Self::SymbolNotFound(_) => ErrorCategory::Validation,

            // Provider errors carry free text; classify by pattern so that a
            // 429/401 surfaced as a generic message is still recognized.
            Self::ProviderError { message, .. } => ErrorClassifier::classify_text(message),

            Self::CircuitOpen { .. }
            | Self::NoProvidersAvailable
            | Self::AllProvidersFailed { .. } => ErrorCategory::Unknown,
        }
    }

    /// Returns the recovery action mapped from the category.
    pub fn recovery_action(&self) -> RecoveryAction {
        self.category().recovery_action()
    }

    /// Whether this error indicates a definitive provider-level failure
    /// (revoked credentials, hard quota, server outage) rather than a
    /// per-symbol problem. Definitive failures feed the provider chain's
    /// critical-error escalation.
    pub fn is_definitive(&self) -> bool {
        match self {
            Self::AuthenticationFailed { .. } | Self::RateLimited { .. } => true,
            Self::ProviderError { message, .. } => ErrorClassifier::is_definitive_text(message),
            _ => false,
        }
    }

    /// Whether this failure should count toward the provider's circuit
    /// breaker. Validation problems reflect bad input, not provider
    /// unavailability, and are excluded.
    pub fn counts_toward_circuit(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Validation)
            && !matches!(self, Self::CircuitOpen { .. })
    }
}
