use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::record::UnifiedRecord;

/// Data source label used by the degradation path for synthetic datasets.
pub const SYNTHETIC_DATA_SOURCE: &str = "cached/test";

/// Overall market tone derived from the advancing/declining split.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Mixed,
}

/// Aggregate statistics over a successful collection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketSummary {
    /// Number of symbols with a positive percent change
    pub advancing: usize,

    /// Number of symbols with a negative percent change
    pub declining: usize,

    /// Mean percent change across all records
    pub average_change: Decimal,

    /// Tone derived from the advancing/declining split
    pub sentiment: Sentiment,

    /// Provider the records came from
    pub data_source: String,
}

impl MarketSummary {
    /// Compute summary statistics for a set of records.
    pub fn from_records(records: &[UnifiedRecord], data_source: impl Into<String>) -> Self {
        let advancing = records.iter().filter(|r| r.is_advancing()).count();
        let declining = records
            .iter()
            .filter(|r| r.percent_change < Decimal::ZERO)
            .count();

        let average_change = if records.is_empty() {
            Decimal::ZERO
        } else {
            let total: Decimal = records.iter().map(|r| r.percent_change).sum();
            total / Decimal::from(records.len())
        };

        let sentiment = if advancing > declining * 2 {
            Sentiment::Bullish
        } else if declining > advancing * 2 {
            Sentiment::Bearish
        } else {
            Sentiment::Mixed
        };

        Self {
            advancing,
            declining,
            average_change,
            sentiment,
            data_source: data_source.into(),
        }
    }
}

/// News headline attached to a collection as best-effort enrichment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Upcoming earnings entry attached as best-effort enrichment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub symbol: String,
    pub date: chrono::NaiveDate,
    pub event: String,
}

/// Secondary context attached to a successful collection.
///
/// Enrichment is best-effort: a failed enrichment fetch never fails the
/// collection, it only leaves these lists empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarketEnrichment {
    #[serde(default)]
    pub news: Vec<Headline>,
    #[serde(default)]
    pub calendar: Vec<CalendarEvent>,
}

impl MarketEnrichment {
    pub fn is_empty(&self) -> bool {
        self.news.is_empty() && self.calendar.is_empty()
    }
}

/// Terminal result of one collection run. Immutable once returned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionResult {
    /// Whether a viable dataset was produced
    pub success: bool,

    /// Unified, deduplicated records (one per symbol)
    pub records: Vec<UnifiedRecord>,

    /// Top movers by percent change, descending
    pub winners: Vec<UnifiedRecord>,

    /// Bottom movers by percent change, ascending
    pub losers: Vec<UnifiedRecord>,

    /// Summary statistics, present when records exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<MarketSummary>,

    /// Provider name, or `cached/test` for the synthetic fallback
    pub data_source: String,

    /// Aggregated failure message when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Definitive provider failures observed during the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_errors: Vec<String>,

    /// Best-effort secondary context (news, calendar)
    #[serde(default, skip_serializing_if = "MarketEnrichment::is_empty")]
    pub enrichment: MarketEnrichment,
}

impl CollectionResult {
    /// Build a failed result with no records.
    pub fn failed(error: impl Into<String>, critical_errors: Vec<String>) -> Self {
        Self {
            success: false,
            records: Vec::new(),
            winners: Vec::new(),
            losers: Vec::new(),
            summary: None,
            data_source: "none".to_string(),
            error: Some(error.into()),
            critical_errors,
            enrichment: MarketEnrichment::default(),
        }
    }

    /// Build a successful result from records, computing winners, losers and
    /// summary statistics.
    ///
    /// `records` keeps the order the caller produced (the sequential path
    /// preserves input order); winners and losers are derived from a sorted
    /// view. `top_n` bounds each movers list, and the two lists are disjoint
    /// even when the record set is smaller than `2 * top_n`.
    pub fn from_records(
        records: Vec<UnifiedRecord>,
        data_source: impl Into<String>,
        top_n: usize,
    ) -> Self {
        let data_source = data_source.into();

        let mut by_change: Vec<&UnifiedRecord> = records.iter().collect();
        by_change.sort_by(|a, b| b.percent_change.cmp(&a.percent_change));

        let movers_each = top_n.min(records.len() / 2);
        let winners: Vec<UnifiedRecord> = by_change
            .iter()
            .take(movers_each)
            .map(|r| (*r).clone())
            .collect();
        let losers: Vec<UnifiedRecord> = by_change
            .iter()
            .rev()
            .take(movers_each)
            .map(|r| (*r).clone())
            .collect();

        let summary = MarketSummary::from_records(&records, data_source.clone());

        Self {
            success: true,
            records,
            winners,
            losers,
            summary: Some(summary),
            data_source,
            error: None,
            critical_errors: Vec::new(),
            enrichment: MarketEnrichment::default(),
        }
    }
}
