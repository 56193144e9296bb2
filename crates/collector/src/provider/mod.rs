//! Market data providers.
//!
//! Each provider adapter normalizes one external API into the shared
//! [`SnapshotProvider`] interface: a per-symbol `fetch_snapshot` returning a
//! [`crate::models::UnifiedRecord`] and errors mapped into the common
//! taxonomy.

pub mod alpha_vantage;
mod budget;
pub mod finnhub;
mod traits;

pub use alpha_vantage::AlphaVantageProvider;
pub use budget::CallBudget;
pub use finnhub::FinnhubProvider;
pub use traits::SnapshotProvider;
