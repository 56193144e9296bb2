//! Text-pattern error classification and rolling recovery statistics.
//!
//! Providers differ in error vocabulary: some surface clean status codes,
//! others free-text throttling messages. The classifier maps raw error text
//! onto one taxonomy so the limiter, retry policy and provider chain can all
//! branch on the same categories.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::warn;

/// Maximum classifications retained by the recovery manager.
const HISTORY_LIMIT: usize = 100;

/// Category assigned to a classified error.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCategory {
    /// Provider throttling (HTTP 429, quota text)
    RateLimit,
    /// Connectivity or timeout problems
    Network,
    /// Rejected credentials (HTTP 401/403)
    Authentication,
    /// Bad input or malformed payloads
    Validation,
    /// Anything unrecognized - handled like a network fault
    Unknown,
}

impl ErrorCategory {
    /// Recovery action mapped from the category.
    pub fn recovery_action(self) -> RecoveryAction {
        match self {
            Self::RateLimit => RecoveryAction::BackoffRetry,
            // Unknown is conservatively treated like a transient network fault
            Self::Network | Self::Unknown => RecoveryAction::BackoffRetry,
            Self::Authentication => RecoveryAction::ManualIntervention,
            Self::Validation => RecoveryAction::Skip,
        }
    }

    /// Severity mapped from the category.
    pub fn severity(self) -> Severity {
        match self {
            Self::Authentication => Severity::Critical,
            Self::RateLimit => Severity::High,
            Self::Network | Self::Unknown => Severity::Medium,
            Self::Validation => Severity::Low,
        }
    }
}

/// How serious a classified error is, for logging and statistics.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What the caller should do about a classified error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecoveryAction {
    /// Retry immediately (bounded by the retry policy)
    Retry,
    /// Retry after exponential backoff
    BackoffRetry,
    /// Skip the item and continue
    Skip,
    /// Stop retrying - an operator has to fix this
    ManualIntervention,
}

/// One classified failure, kept for rolling statistics only. Not persisted.
#[derive(Clone, Debug)]
pub struct ErrorReport {
    /// Provider the error came from
    pub provider: String,
    /// Free-form call context, e.g. "fetch AAPL"
    pub context: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub action: RecoveryAction,
    pub at: DateTime<Utc>,
}

/// Substring / status-code pattern classifier.
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify raw error text into a category.
    ///
    /// Matching is case-insensitive and intentionally loose: providers embed
    /// status codes and throttling phrases in otherwise free-form messages.
    pub fn classify_text(text: &str) -> ErrorCategory {
        let lower = text.to_lowercase();

        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("rate limit")
            || lower.contains("quota")
            || lower.contains("throttl")
        {
            return ErrorCategory::RateLimit;
        }

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("invalid api key")
            || lower.contains("invalid key")
            || lower.contains("api key")
        {
            return ErrorCategory::Authentication;
        }

        if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("network")
            || lower.contains("dns")
            || lower.contains("unreachable")
        {
            return ErrorCategory::Network;
        }

        if lower.contains("missing field")
            || lower.contains("parse")
            || lower.contains("invalid symbol")
            || lower.contains("not found")
            || lower.contains("malformed")
        {
            return ErrorCategory::Validation;
        }

        ErrorCategory::Unknown
    }

    /// Whether raw error text matches a definitive provider-level failure:
    /// HTTP 401/403/429 or a 5xx status. These escalate to critical errors
    /// in the provider chain.
    pub fn is_definitive_text(text: &str) -> bool {
        let lower = text.to_lowercase();

        if matches!(
            Self::classify_text(text),
            ErrorCategory::RateLimit | ErrorCategory::Authentication
        ) {
            return true;
        }

        // Server-side outages: "HTTP 500", "503 service unavailable", ...
        ["500", "502", "503", "504", "server error", "service unavailable"]
            .iter()
            .any(|p| lower.contains(p))
    }

    /// Build a full report for raw error text.
    pub fn classify(
        provider: impl Into<String>,
        context: impl Into<String>,
        text: &str,
    ) -> ErrorReport {
        let category = Self::classify_text(text);
        ErrorReport {
            provider: provider.into(),
            context: context.into(),
            category,
            severity: category.severity(),
            action: category.recovery_action(),
            at: Utc::now(),
        }
    }
}

/// Per-category classification counts.
#[derive(Clone, Debug, Default)]
pub struct RecoveryStats {
    pub rate_limit: usize,
    pub network: usize,
    pub authentication: usize,
    pub validation: usize,
    pub unknown: usize,
}

impl RecoveryStats {
    pub fn total(&self) -> usize {
        self.rate_limit + self.network + self.authentication + self.validation + self.unknown
    }
}

/// Rolling history of classified errors.
///
/// Keeps the last [`HISTORY_LIMIT`] classifications for observability. The
/// history is process-lifetime only and shared behind one mutex; classifying
/// is cheap enough that contention is not a concern.
pub struct RecoveryManager {
    history: Mutex<VecDeque<ErrorReport>>,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
        }
    }

    /// Lock the history, recovering from poison if necessary. Losing a few
    /// statistics entries is preferable to panicking.
    fn lock_history(&self) -> MutexGuard<'_, VecDeque<ErrorReport>> {
        self.history.lock().unwrap_or_else(|poisoned| {
            warn!("Recovery manager mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Classify an error, record it, and return the report so the caller can
    /// apply provider-level consequences.
    pub fn handle(
        &self,
        provider: impl Into<String>,
        context: impl Into<String>,
        text: &str,
    ) -> ErrorReport {
        let report = ErrorClassifier::classify(provider, context, text);
        self.record(report.clone());
        report
    }

    /// Record an already-built report.
    pub fn record(&self, report: ErrorReport) {
        let mut history = self.lock_history();
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(report);
    }

    /// Per-category counts over the retained history.
    pub fn stats(&self) -> RecoveryStats {
        let history = self.lock_history();
        let mut stats = RecoveryStats::default();

        for report in history.iter() {
            match report.category {
                ErrorCategory::RateLimit => stats.rate_limit += 1,
                ErrorCategory::Network => stats.network += 1,
                ErrorCategory::Authentication => stats.authentication += 1,
                ErrorCategory::Validation => stats.validation += 1,
                ErrorCategory::Unknown => stats.unknown += 1,
            }
        }

        stats
    }

    /// Most recent classifications, newest last.
    pub fn recent(&self, n: usize) -> Vec<ErrorReport> {
        let history = self.lock_history();
        history.iter().rev().take(n).rev().cloned().collect()
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}
