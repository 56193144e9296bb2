//! Provider call budgets.
//!
//! Describes how aggressively a provider may be called. Budgets are
//! configuration only: the limiter enforces `base_delay` spacing, while the
//! per-minute/per-day figures document the provider's published quota and
//! feed operator dashboards. Nothing here self-enforces the daily quota.

use std::time::Duration;

/// Call budget for a provider.
#[derive(Clone, Debug)]
pub struct CallBudget {
    /// Published calls-per-minute quota.
    pub calls_per_minute: u32,

    /// Published calls-per-day quota.
    pub calls_per_day: u32,

    /// Minimum spacing between calls enforced by the rate limiter.
    pub base_delay: Duration,
}

impl Default for CallBudget {
    fn default() -> Self {
        Self {
            calls_per_minute: 60,
            calls_per_day: 10_000,
            base_delay: Duration::from_millis(500),
        }
    }
}
