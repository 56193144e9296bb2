//! Terminal behavior when every provider has failed.
//!
//! Production runs return a clearly labeled failure and never substitute
//! fabricated data. Non-production runs substitute a small deterministic
//! placeholder dataset so downstream consumers can be exercised without
//! live providers, labeled with the synthetic data source.

use log::{error, warn};
use rust_decimal::Decimal;

use crate::models::{CollectionResult, UnifiedRecord, SYNTHETIC_DATA_SOURCE};

/// Fixed symbols the placeholder dataset covers.
const PLACEHOLDER_SYMBOLS: [&str; 5] = ["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA"];

/// Resolves a total-failure run into its terminal result.
pub struct DegradationPolicy {
    top_movers: usize,
}

impl DegradationPolicy {
    pub fn new(top_movers: usize) -> Self {
        Self { top_movers }
    }

    /// Build the result for a run where no provider produced viable data.
    pub fn resolve(
        &self,
        production_mode: bool,
        error: String,
        critical_errors: Vec<String>,
    ) -> CollectionResult {
        if production_mode {
            error!("Collection failed with no usable provider: {}", error);
            return CollectionResult::failed(error, critical_errors);
        }

        warn!(
            "Collection failed ({}), substituting placeholder dataset",
            error
        );

        let mut result = CollectionResult::from_records(
            Self::placeholder_records(),
            SYNTHETIC_DATA_SOURCE,
            self.top_movers,
        );
        result.critical_errors = critical_errors;
        result
    }

    /// Deterministic records over the fixed symbol subset.
    ///
    /// Values are position-derived so repeated runs and assertions see the
    /// same data; percent changes alternate in sign to exercise both the
    /// winners and losers lists.
    fn placeholder_records() -> Vec<UnifiedRecord> {
        PLACEHOLDER_SYMBOLS
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let i = i as i64;
                let price = Decimal::from(100 + i * 25);
                let percent_change = if i % 2 == 0 {
                    Decimal::new(50 + i * 25, 2)
                } else {
                    Decimal::new(-(25 + i * 25), 2)
                };
                let mut record =
                    UnifiedRecord::new(*symbol, price, percent_change, SYNTHETIC_DATA_SOURCE);
                record.previous_close = Some(price - price * percent_change / Decimal::from(100));
                record
            })
            .collect()
    }
}
