//! Per-run diagnostics for the provider chain.
//!
//! Records what happened at each provider in one collection run so the
//! outcome can be logged and explained: which providers were skipped and
//! why, which failed, and which produced the data.

use std::fmt::Write as _;

/// Why a provider was skipped without being called.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// Circuit breaker is open for this provider.
    CircuitOpen,
    /// Provider was disabled for the rest of the session.
    SessionDisabled,
    /// The collection deadline passed before this provider's turn.
    DeadlineExceeded,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::SessionDisabled => write!(f, "disabled for session"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Outcome of one provider's turn in the chain.
#[derive(Clone, Debug)]
pub enum AttemptOutcome {
    Success { records: usize },
    Failure { message: String },
    Skipped(SkipReason),
}

/// One provider attempt within a run.
#[derive(Clone, Debug)]
pub struct ProviderAttempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
}

/// Accumulated attempts for one collection run.
#[derive(Debug, Default)]
pub struct ChainDiagnostics {
    attempts: Vec<ProviderAttempt>,
}

impl ChainDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, provider: &str, records: usize) {
        self.attempts.push(ProviderAttempt {
            provider: provider.to_string(),
            outcome: AttemptOutcome::Success { records },
        });
    }

    pub fn record_failure(&mut self, provider: &str, message: impl Into<String>) {
        self.attempts.push(ProviderAttempt {
            provider: provider.to_string(),
            outcome: AttemptOutcome::Failure {
                message: message.into(),
            },
        });
    }

    pub fn record_skip(&mut self, provider: &str, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            provider: provider.to_string(),
            outcome: AttemptOutcome::Skipped(reason),
        });
    }

    pub fn attempts(&self) -> &[ProviderAttempt] {
        &self.attempts
    }

    /// One-line human-readable account of the run, oldest attempt first.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no providers attempted".to_string();
        }

        let mut out = String::new();
        for (i, attempt) in self.attempts.iter().enumerate() {
            if i > 0 {
                out.push_str("; ");
            }
            match &attempt.outcome {
                AttemptOutcome::Success { records } => {
                    let _ = write!(out, "{}: ok ({} records)", attempt.provider, records);
                }
                AttemptOutcome::Failure { message } => {
                    let _ = write!(out, "{}: failed ({})", attempt.provider, message);
                }
                AttemptOutcome::Skipped(reason) => {
                    let _ = write!(out, "{}: skipped ({})", attempt.provider, reason);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let diagnostics = ChainDiagnostics::new();
        assert_eq!(diagnostics.summary(), "no providers attempted");
    }

    #[test]
    fn test_summary_orders_attempts() {
        let mut diagnostics = ChainDiagnostics::new();
        diagnostics.record_skip("FINNHUB", SkipReason::CircuitOpen);
        diagnostics.record_failure("ALPHA_VANTAGE", "HTTP 429");
        diagnostics.record_success("FALLBACK", 12);

        let summary = diagnostics.summary();
        assert_eq!(
            summary,
            "FINNHUB: skipped (circuit open); ALPHA_VANTAGE: failed (HTTP 429); FALLBACK: ok (12 records)"
        );
        assert_eq!(diagnostics.attempts().len(), 3);
    }
}
