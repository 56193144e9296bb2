//! Chunked batch execution against a single provider.
//!
//! The orchestrator walks a symbol list in fixed-size chunks with pacing
//! between chunks and aborts early once a provider looks persistently
//! broken, returning whatever succeeded so far. Individual item failures
//! are counted, never raised.

mod concurrent;
mod fetch;

pub use concurrent::{ConcurrentCollector, ConcurrentOptions, ConcurrentReport, StopCause};
pub use fetch::GuardedFetch;

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use crate::errors::{CollectError, ErrorCategory};
use crate::models::{Symbol, UnifiedRecord};

/// Default chunk size.
const DEFAULT_BATCH_SIZE: usize = 10;

/// Default pause between chunks.
const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(2);

/// Default consecutive-failure abort threshold.
const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Options for one batch run.
#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Symbols per chunk.
    pub batch_size: usize,
    /// Pause between chunks (never applied after the last one).
    pub batch_delay: Duration,
    /// Consecutive failures that abort the run.
    pub max_consecutive_errors: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

/// Outcome of one batch run. Failures are statistics, not errors.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successfully fetched records, in input order.
    pub records: Vec<UnifiedRecord>,
    /// Symbols attempted before the run ended.
    pub attempted: usize,
    /// Failed symbol fetches.
    pub failed: usize,
    /// Failures that were rate-limit flavored.
    pub rate_limit_hits: usize,
    /// Whether the run stopped before exhausting the symbol list.
    pub aborted: bool,
    /// Most recent non-definitive failure, for provider-level reporting.
    pub last_error: Option<CollectError>,
    /// First definitive failure observed (auth, hard quota, server outage),
    /// kept even when later generic failures end the run.
    pub definitive_error: Option<CollectError>,
}

/// Chunked, early-terminating executor for one provider.
pub struct BatchOrchestrator {
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    /// Process `symbols` in chunks, invoking `fetch` per symbol.
    ///
    /// Both generic and rate-limit failures count toward the consecutive
    /// error threshold. The run aborts early - returning what succeeded so
    /// far - once that threshold is reached or an entire chunk yields zero
    /// successes. Sleeps `batch_delay` between chunks, never after the last.
    pub async fn run<F, Fut>(&self, symbols: &[Symbol], fetch: F) -> BatchReport
    where
        F: Fn(Symbol) -> Fut,
        Fut: Future<Output = Result<UnifiedRecord, CollectError>>,
    {
        let mut report = BatchReport::default();
        let mut consecutive_errors: u32 = 0;

        let chunk_size = self.options.batch_size.max(1);
        let total_chunks = symbols.len().div_ceil(chunk_size);

        for (chunk_index, chunk) in symbols.chunks(chunk_size).enumerate() {
            let mut chunk_successes = 0usize;

            for symbol in chunk {
                report.attempted += 1;

                match fetch(symbol.clone()).await {
                    Ok(record) => {
                        report.records.push(record);
                        chunk_successes += 1;
                        consecutive_errors = 0;
                    }
                    Err(error) => {
                        report.failed += 1;
                        consecutive_errors += 1;

                        if error.category() == ErrorCategory::RateLimit {
                            report.rate_limit_hits += 1;
                        }

                        warn!("Batch: fetch failed for '{}': {}", symbol, error);
                        if error.is_definitive() && report.definitive_error.is_none() {
                            report.definitive_error = Some(error);
                        } else {
                            report.last_error = Some(error);
                        }

                        if consecutive_errors >= self.options.max_consecutive_errors {
                            warn!(
                                "Batch: aborting after {} consecutive errors ({} of {} symbols attempted)",
                                consecutive_errors,
                                report.attempted,
                                symbols.len()
                            );
                            report.aborted = true;
                            return report;
                        }
                    }
                }
            }

            if chunk_successes == 0 && !chunk.is_empty() {
                warn!(
                    "Batch: chunk {}/{} yielded zero successes, aborting",
                    chunk_index + 1,
                    total_chunks
                );
                report.aborted = true;
                return report;
            }

            let is_last = chunk_index + 1 == total_chunks;
            if !is_last {
                debug!(
                    "Batch: chunk {}/{} done, sleeping {:?}",
                    chunk_index + 1,
                    total_chunks,
                    self.options.batch_delay
                );
                tokio::time::sleep(self.options.batch_delay).await;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn symbols(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn options(max_consecutive_errors: u32) -> BatchOptions {
        BatchOptions {
            batch_size: 3,
            batch_delay: Duration::from_millis(1),
            max_consecutive_errors,
        }
    }

    fn ok_record(symbol: &str) -> UnifiedRecord {
        UnifiedRecord::new(symbol, dec!(100), dec!(1), "TEST")
    }

    #[tokio::test]
    async fn test_all_successes_preserve_order() {
        let orchestrator = BatchOrchestrator::new(options(3));
        let syms = symbols(&["A", "B", "C", "D", "E"]);

        let report = orchestrator
            .run(&syms, |s| async move { Ok(ok_record(&s)) })
            .await;

        assert_eq!(report.attempted, 5);
        assert_eq!(report.failed, 0);
        assert!(!report.aborted);
        let order: Vec<&str> = report.records.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test]
    async fn test_always_failing_fetch_aborts_at_threshold() {
        let orchestrator = BatchOrchestrator::new(options(3));
        let syms = symbols(&["A", "B", "C", "D", "E", "F", "G", "H"]);
        let calls = AtomicUsize::new(0);

        let report = orchestrator
            .run(&syms, |s| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(CollectError::ProviderError {
                        provider: "TEST".to_string(),
                        message: format!("boom {}", s),
                    })
                }
            })
            .await;

        // Stops after exactly 3 failures, not 8
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.failed, 3);
        assert!(report.aborted);
        assert!(report.records.is_empty());
        assert!(report.last_error.is_some());
    }

    #[tokio::test]
    async fn test_interleaved_failures_reset_counter() {
        let orchestrator = BatchOrchestrator::new(BatchOptions {
            batch_size: 10,
            batch_delay: Duration::from_millis(1),
            max_consecutive_errors: 2,
        });
        let syms = symbols(&["A", "bad", "B", "bad", "C"]);

        let report = orchestrator
            .run(&syms, |s| async move {
                if s == "bad" {
                    Err(CollectError::Timeout {
                        provider: "TEST".to_string(),
                    })
                } else {
                    Ok(ok_record(&s))
                }
            })
            .await;

        // Failures never run consecutively, so the run completes
        assert!(!report.aborted);
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.failed, 2);
    }

    #[tokio::test]
    async fn test_zero_success_chunk_aborts() {
        let orchestrator = BatchOrchestrator::new(BatchOptions {
            batch_size: 2,
            batch_delay: Duration::from_millis(1),
            // High threshold so only the chunk rule can trigger
            max_consecutive_errors: 100,
        });
        let syms = symbols(&["A", "B", "C", "D", "E", "F"]);

        let report = orchestrator
            .run(&syms, |s| async move {
                if s == "A" || s == "B" {
                    Ok(ok_record(&s))
                } else {
                    Err(CollectError::Timeout {
                        provider: "TEST".to_string(),
                    })
                }
            })
            .await;

        // First chunk succeeds, second chunk (C, D) yields nothing
        assert!(report.aborted);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.attempted, 4);
    }

    #[tokio::test]
    async fn test_early_definitive_error_survives_later_failures() {
        let orchestrator = BatchOrchestrator::new(options(3));
        let syms = symbols(&["A", "B", "C", "D"]);
        let calls = AtomicUsize::new(0);

        // First failure is a hard 401, the run then aborts on timeouts
        let report = orchestrator
            .run(&syms, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(CollectError::AuthenticationFailed {
                            provider: "TEST".to_string(),
                            message: "Invalid API key".to_string(),
                        })
                    } else {
                        Err(CollectError::Timeout {
                            provider: "TEST".to_string(),
                        })
                    }
                }
            })
            .await;

        assert!(report.aborted);
        assert!(matches!(
            report.definitive_error,
            Some(CollectError::AuthenticationFailed { .. })
        ));
        assert!(matches!(
            report.last_error,
            Some(CollectError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_failures_counted() {
        let orchestrator = BatchOrchestrator::new(options(10));
        let syms = symbols(&["A", "B"]);

        let report = orchestrator
            .run(&syms, |s| async move {
                if s == "A" {
                    Err(CollectError::RateLimited {
                        provider: "TEST".to_string(),
                    })
                } else {
                    Ok(ok_record(&s))
                }
            })
            .await;

        assert_eq!(report.rate_limit_hits, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_raised() {
        let orchestrator = BatchOrchestrator::new(options(10));
        let syms = symbols(&["A", "bad", "C"]);

        // A failing item does not stop the remaining items
        let report = orchestrator
            .run(&syms, |s| async move {
                if s == "bad" {
                    Err(CollectError::ValidationFailed {
                        message: "negative price".to_string(),
                    })
                } else {
                    Ok(ok_record(&s))
                }
            })
            .await;

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.attempted, 3);
    }
}
