use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalized market snapshot for a single symbol.
///
/// Every provider adapter maps its own payload shape into this row before it
/// re-enters the orchestrator, so downstream consumers never see
/// provider-specific structures. Exactly one provider produced each record;
/// its id is recorded in `provenance`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnifiedRecord {
    /// Ticker symbol as requested by the caller
    pub symbol: String,

    /// Display name, when the provider supplies one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Latest traded price (required)
    pub price: Decimal,

    /// Opening price of the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    /// Session high
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,

    /// Session low
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,

    /// Previous session close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<Decimal>,

    /// Absolute change versus previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,

    /// Percent change versus previous close
    pub percent_change: Decimal,

    /// Session volume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,

    /// Trailing average daily volume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_volume: Option<Decimal>,

    /// 14-period relative strength index, when computed upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi_14: Option<Decimal>,

    /// 20-period simple moving average, when computed upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_20: Option<Decimal>,

    /// Provider that produced this record (FINNHUB, ALPHA_VANTAGE, ...)
    pub provenance: String,

    /// When the record was fetched
    pub fetched_at: DateTime<Utc>,
}

impl UnifiedRecord {
    /// Create a record with the minimal required fields.
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        percent_change: Decimal,
        provenance: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            price,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            change: None,
            percent_change,
            volume: None,
            average_volume: None,
            rsi_14: None,
            sma_20: None,
            provenance: provenance.into(),
            fetched_at: Utc::now(),
        }
    }

    /// Whether the symbol advanced on the session.
    pub fn is_advancing(&self) -> bool {
        self.percent_change > Decimal::ZERO
    }
}
