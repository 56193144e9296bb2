//! Provider trait definitions.
//!
//! This module defines the `SnapshotProvider` trait that every market data
//! source must implement. Each adapter normalizes its provider's payload
//! shape into [`UnifiedRecord`] and its error vocabulary into
//! [`CollectError`], so the orchestration layers never branch on
//! provider-specific details.

use async_trait::async_trait;

use crate::errors::CollectError;
use crate::models::UnifiedRecord;

use super::budget::CallBudget;

/// Trait for market data providers.
///
/// Implement this to add support for a new data source. The chain uses
/// `priority` to decide fallback order and `budget` to configure pacing.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use marketbrief_collector::provider::{CallBudget, SnapshotProvider};
///
/// struct MyProvider {
///     api_key: String,
/// }
///
/// #[async_trait]
/// impl SnapshotProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn budget(&self) -> CallBudget {
///         CallBudget::default()
///     }
///
///     // ... implement fetch_snapshot
/// }
/// ```
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// A constant string like "FINNHUB" or "ALPHA_VANTAGE", used for
    /// logging, circuit breaker tracking, and record provenance.
    fn id(&self) -> &'static str;

    /// Fallback ordering rank. Lower values = higher priority. Default 10.
    fn priority(&self) -> u8 {
        10
    }

    /// Call budget for pacing configuration.
    fn budget(&self) -> CallBudget;

    /// Fetch the current snapshot for one symbol.
    ///
    /// Returns a normalized record with `provenance` set to [`id`](Self::id),
    /// or a [`CollectError`] classified into the shared taxonomy (rate
    /// limiting, timeout, authentication, validation).
    async fn fetch_snapshot(&self, symbol: &str) -> Result<UnifiedRecord, CollectError>;
}
