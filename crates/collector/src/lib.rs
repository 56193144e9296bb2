//! Resilient multi-source market data collection.
//!
//! This crate acquires snapshot data for a set of ticker symbols from
//! several unreliable, rate-limited third-party providers and produces one
//! unified dataset. Providers are tried in priority order; every call runs
//! through a shared set of resilience components so persistently failing
//! providers are isolated automatically and throttling is absorbed rather
//! than propagated.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ProviderChain                         │
//! │   priority order · critical-error escalation · degradation  │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │                             │
//!     ┌───────────▼───────────┐     ┌───────────▼───────────┐
//!     │   BatchOrchestrator   │     │  ConcurrentCollector  │
//!     │  chunked, sequential  │     │  bounded worker pool  │
//!     └───────────┬───────────┘     └───────────┬───────────┘
//!                 │                             │
//!                 └──────────────┬──────────────┘
//!                                │ per-symbol call
//!                 ┌──────────────▼──────────────┐
//!                 │        GuardedFetch         │
//!                 │ CircuitBreaker → RateLimiter│
//!                 │ → RetryPolicy → Validator   │
//!                 └──────────────┬──────────────┘
//!                                │
//!                 ┌──────────────▼──────────────┐
//!                 │      SnapshotProvider       │
//!                 │   Finnhub · Alpha Vantage   │
//!                 └─────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use marketbrief_collector::chain::ProviderChain;
//! use marketbrief_collector::config::CollectorConfig;
//! use marketbrief_collector::provider::{FinnhubProvider, SnapshotProvider};
//!
//! let providers: Vec<Arc<dyn SnapshotProvider>> =
//!     vec![Arc::new(FinnhubProvider::new(api_key))];
//! let chain = ProviderChain::new(providers, CollectorConfig::default());
//!
//! let result = chain.collect(&symbols, true).await;
//! if result.success {
//!     println!("{} records from {}", result.records.len(), result.data_source);
//! }
//! ```

pub mod batch;
pub mod chain;
pub mod config;
pub mod enrich;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;

pub use chain::ProviderChain;
pub use config::CollectorConfig;
pub use errors::CollectError;
pub use models::{CollectionResult, UnifiedRecord};
