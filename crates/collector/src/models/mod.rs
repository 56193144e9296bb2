//! Data model for the collection layer
//!
//! - `types` - Type aliases for common identifiers (ProviderId, Symbol)
//! - `record` - The normalized per-symbol row (UnifiedRecord)
//! - `result` - Terminal collection output (CollectionResult, MarketSummary)

mod record;
mod result;
mod types;

pub use record::UnifiedRecord;
pub use result::{
    CalendarEvent, CollectionResult, Headline, MarketEnrichment, MarketSummary, Sentiment,
    SYNTHETIC_DATA_SOURCE,
};
pub use types::{ProviderId, Symbol};
