//! Worker-pool variant of the batch orchestrator.
//!
//! Fetches symbols concurrently under a semaphore bound. Each worker call
//! still goes through the full [`GuardedFetch`] pipeline, so circuit breaker
//! and rate limiter guarantees hold under concurrency; the limiter serializes
//! the actual provider calls by reserving send slots. Result ordering is not
//! guaranteed.
//!
//! Between batches the collector samples its own resident memory and checks
//! a cooperative shutdown flag, stopping cleanly with whatever was gathered.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::models::{Symbol, UnifiedRecord};

use super::fetch::GuardedFetch;

/// Default worker-pool size.
const DEFAULT_MAX_WORKERS: usize = 4;

/// Default symbols per batch.
const DEFAULT_BATCH_SIZE: usize = 10;

/// Default resident-memory ceiling: 2 GiB.
const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Options for a concurrent run.
#[derive(Clone, Debug)]
pub struct ConcurrentOptions {
    /// Maximum in-flight fetches.
    pub max_workers: usize,
    /// Symbols dispatched per batch; memory and shutdown are checked at
    /// batch boundaries.
    pub batch_size: usize,
    /// Resident-memory ceiling; exceeding it stops the run.
    pub memory_limit_bytes: u64,
}

impl Default for ConcurrentOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
        }
    }
}

/// Why a concurrent run stopped before exhausting its symbols.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopCause {
    /// The cooperative shutdown flag was raised.
    Shutdown,
    /// Resident memory exceeded the configured ceiling.
    MemoryPressure,
}

/// Outcome of a concurrent run. Records carry no ordering guarantee.
#[derive(Debug, Default)]
pub struct ConcurrentReport {
    pub records: Vec<UnifiedRecord>,
    pub attempted: usize,
    pub failed: usize,
    pub stop_cause: Option<StopCause>,
}

/// Semaphore-bounded concurrent fetcher for one provider.
pub struct ConcurrentCollector {
    options: ConcurrentOptions,
    shutdown: Arc<AtomicBool>,
}

impl ConcurrentCollector {
    pub fn new(options: ConcurrentOptions) -> Self {
        Self {
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the run at the next batch or item boundary.
    ///
    /// Hand this to a signal handler; setting it never interrupts an
    /// in-flight provider call.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Fetch `symbols` concurrently through `fetch`.
    pub async fn run(&self, symbols: &[Symbol], fetch: Arc<GuardedFetch>) -> ConcurrentReport {
        let semaphore = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let results: Arc<Mutex<Vec<UnifiedRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let attempted = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let mut stop_cause = None;
        let chunk_size = self.options.batch_size.max(1);

        for chunk in symbols.chunks(chunk_size) {
            if self.shutdown.load(Ordering::SeqCst) {
                info!(
                    "Concurrent: shutdown requested, stopping with {} records",
                    lock_results(&results).len()
                );
                stop_cause = Some(StopCause::Shutdown);
                break;
            }

            let mut tasks: JoinSet<()> = JoinSet::new();

            for symbol in chunk {
                let symbol = symbol.clone();
                let fetch = fetch.clone();
                let semaphore = semaphore.clone();
                let results = results.clone();
                let attempted = attempted.clone();
                let failed = failed.clone();
                let shutdown = self.shutdown.clone();

                tasks.spawn(async move {
                    // A closed semaphore is impossible here; skip the item
                    // rather than panic if it ever happens.
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };

                    if shutdown.load(Ordering::SeqCst) {
                        return;
                    }

                    attempted.fetch_add(1, Ordering::SeqCst);
                    match fetch.fetch(symbol).await {
                        Ok(record) => {
                            lock_results(&results).push(record);
                        }
                        Err(error) => {
                            failed.fetch_add(1, Ordering::SeqCst);
                            debug!("Concurrent: fetch failed: {}", error);
                        }
                    }
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(error) = joined {
                    warn!("Concurrent: worker task failed: {}", error);
                }
            }

            if let Some(resident) = resident_memory_bytes() {
                if resident > self.options.memory_limit_bytes {
                    warn!(
                        "Concurrent: resident memory {} bytes exceeds limit {} bytes, stopping",
                        resident, self.options.memory_limit_bytes
                    );
                    stop_cause = Some(StopCause::MemoryPressure);
                    break;
                }
            }
        }

        let records = std::mem::take(&mut *lock_results(&results));

        ConcurrentReport {
            records,
            attempted: attempted.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
            stop_cause,
        }
    }
}

/// Lock the shared result list, recovering from poison if necessary.
fn lock_results(results: &Mutex<Vec<UnifiedRecord>>) -> MutexGuard<'_, Vec<UnifiedRecord>> {
    results.lock().unwrap_or_else(|poisoned| {
        warn!("Concurrent result mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Resident set size in bytes, from the VmRSS line of /proc/self/status.
/// The line is unit-labeled (kB), so no page-size assumption is needed.
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}
