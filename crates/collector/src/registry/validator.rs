//! Record validation.
//!
//! Validates normalized records from providers before they enter the unified
//! dataset:
//! - session range invariants (high >= low, price within range)
//! - non-negative prices and volume
//! - sane percent-change magnitudes
//!
//! A hard failure drops the record as a `Validation` error, which skips the
//! symbol without a circuit breaker penalty: it reflects bad data, not
//! provider unavailability. Soft issues are logged and accepted.

use log::warn;
use rust_decimal::Decimal;

use crate::errors::CollectError;
use crate::models::UnifiedRecord;

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Reject the record.
    Hard,
    /// Accept the record but log a warning.
    Soft,
}

/// A single validation finding.
#[derive(Clone, Debug)]
struct ValidationIssue {
    severity: ValidationSeverity,
    message: String,
}

/// Record validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Reject records with negative prices.
    pub reject_negative_prices: bool,
    /// Reject records where high < low.
    pub reject_invalid_range: bool,
    /// Sanity cap on prices.
    pub max_price: Option<Decimal>,
    /// Absolute percent-change magnitude above which a record is suspect.
    pub max_percent_change: Option<Decimal>,
    /// Warn when the session volume is zero.
    pub warn_on_zero_volume: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reject_negative_prices: true,
            reject_invalid_range: true,
            max_price: Some(Decimal::from(1_000_000_000i64)),
            max_percent_change: Some(Decimal::from(75)),
            warn_on_zero_volume: true,
        }
    }
}

/// Validator for normalized records.
pub struct RecordValidator {
    config: ValidatorConfig,
}

impl RecordValidator {
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a record.
    ///
    /// Returns Ok(()) when the record is acceptable; hard failures return
    /// `CollectError::ValidationFailed` with the joined messages. Soft
    /// issues are logged, never rejected.
    pub fn validate(&self, record: &UnifiedRecord) -> Result<(), CollectError> {
        let mut issues: Vec<ValidationIssue> = Vec::new();

        if record.symbol.trim().is_empty() {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: "Empty symbol".to_string(),
            });
        }

        self.check_prices(record, &mut issues);
        self.check_range(record, &mut issues);
        self.check_percent_change(record, &mut issues);
        self.check_volume(record, &mut issues);

        let hard: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !hard.is_empty() {
            return Err(CollectError::ValidationFailed {
                message: hard.join("; "),
            });
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!(
                "Record validation warning for '{}': {}",
                record.symbol, issue.message
            );
        }

        Ok(())
    }

    fn check_prices(&self, record: &UnifiedRecord, issues: &mut Vec<ValidationIssue>) {
        if self.config.reject_negative_prices {
            if record.price < Decimal::ZERO {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Hard,
                    message: format!("Negative price: {}", record.price),
                });
            }
            for (label, value) in [
                ("open", record.open),
                ("high", record.high),
                ("low", record.low),
                ("previous close", record.previous_close),
            ] {
                if let Some(v) = value {
                    if v < Decimal::ZERO {
                        issues.push(ValidationIssue {
                            severity: ValidationSeverity::Hard,
                            message: format!("Negative {} price: {}", label, v),
                        });
                    }
                }
            }
        }

        if let Some(max_price) = self.config.max_price {
            if record.price > max_price {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Soft,
                    message: format!(
                        "Price ({}) exceeds sanity threshold ({})",
                        record.price, max_price
                    ),
                });
            }
        }
    }

    fn check_range(&self, record: &UnifiedRecord, issues: &mut Vec<ValidationIssue>) {
        if !self.config.reject_invalid_range {
            return;
        }

        if let (Some(high), Some(low)) = (record.high, record.low) {
            if high < low {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Hard,
                    message: format!("High ({}) is less than Low ({})", high, low),
                });
            } else if record.price > high || record.price < low {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Soft,
                    message: format!(
                        "Price ({}) is outside High/Low range ({}-{})",
                        record.price, low, high
                    ),
                });
            }
        }
    }

    fn check_percent_change(&self, record: &UnifiedRecord, issues: &mut Vec<ValidationIssue>) {
        if let Some(max) = self.config.max_percent_change {
            if record.percent_change.abs() > max {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Soft,
                    message: format!(
                        "Percent change ({}) exceeds plausibility threshold ({})",
                        record.percent_change, max
                    ),
                });
            }
        }
    }

    fn check_volume(&self, record: &UnifiedRecord, issues: &mut Vec<ValidationIssue>) {
        if let Some(volume) = record.volume {
            if volume < Decimal::ZERO {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Hard,
                    message: format!("Negative volume: {}", volume),
                });
            } else if self.config.warn_on_zero_volume && volume == Decimal::ZERO {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Soft,
                    message: "Zero volume (market may be closed)".to_string(),
                });
            }
        }
    }
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new()
    }
}
