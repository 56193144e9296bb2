//! Alpha Vantage snapshot provider.
//!
//! Fetches current quotes via the GLOBAL_QUOTE function. Alpha Vantage
//! reports rate limiting through "Note"/"Information" fields in an HTTP 200
//! body, so API-level errors are checked in addition to status codes.
//! Free tier: 25 requests per day.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::CollectError;
use crate::models::UnifiedRecord;
use crate::provider::{CallBudget, SnapshotProvider};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";

/// Envelope for the GLOBAL_QUOTE function.
#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    quote: Option<GlobalQuote>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

/// Quote fields; Alpha Vantage prefixes keys with ordinal numbers.
#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "02. open")]
    open: Option<String>,
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

/// Alpha Vantage snapshot provider.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

impl AlphaVantageProvider {
    /// Create a new Alpha Vantage provider with the given API key.
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, api_key }
    }

    /// Make a request to the Alpha Vantage API.
    async fn fetch(&self, params: &[(&str, &str)]) -> Result<String, CollectError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(BASE_URL, &all_params).map_err(|e| {
            CollectError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to build URL: {}", e),
            }
        })?;

        debug!(
            "Alpha Vantage request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CollectError::Timeout {
                    provider: PROVIDER_ID.to_string(),
                }
            } else {
                CollectError::ProviderError {
                    provider: PROVIDER_ID.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CollectError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CollectError::AuthenticationFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        if !status.is_success() {
            return Err(CollectError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        response
            .text()
            .await
            .map_err(|e| CollectError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: e.to_string(),
            })
    }

    /// Check for API-level errors reported inside a 200 body.
    fn check_api_error(response: &GlobalQuoteResponse) -> Result<(), CollectError> {
        if let Some(ref msg) = response.error_message {
            if msg.contains("Invalid API call") || msg.contains("not found") {
                return Err(CollectError::SymbolNotFound(msg.clone()));
            }
            return Err(CollectError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: msg.clone(),
            });
        }

        // "Note" usually indicates rate limiting
        if let Some(ref msg) = response.note {
            if msg.contains("API call frequency") || msg.contains("rate limit") {
                return Err(CollectError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            warn!("Alpha Vantage note: {}", msg);
        }

        if let Some(ref msg) = response.information {
            if msg.contains("API call frequency")
                || msg.contains("rate limit")
                || msg.contains("premium")
            {
                return Err(CollectError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            warn!("Alpha Vantage info: {}", msg);
        }

        Ok(())
    }

    fn parse_decimal(s: &Option<String>) -> Option<Decimal> {
        s.as_deref().and_then(|v| Decimal::from_str(v).ok())
    }

    /// Parse "1.0234%" into a Decimal percent value.
    fn parse_percent(s: &Option<String>) -> Option<Decimal> {
        s.as_deref()
            .map(|v| v.trim_end_matches('%'))
            .and_then(|v| Decimal::from_str(v).ok())
    }
}

#[async_trait]
impl SnapshotProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        10
    }

    fn budget(&self) -> CallBudget {
        CallBudget {
            calls_per_minute: 5,
            calls_per_day: 25,
            base_delay: Duration::from_secs(13),
        }
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<UnifiedRecord, CollectError> {
        let body = self
            .fetch(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)])
            .await?;

        let response: GlobalQuoteResponse =
            serde_json::from_str(&body).map_err(|e| CollectError::ValidationFailed {
                message: format!("Malformed quote payload for '{}': {}", symbol, e),
            })?;

        Self::check_api_error(&response)?;

        let quote = response
            .quote
            .ok_or_else(|| CollectError::SymbolNotFound(symbol.to_string()))?;

        let price = Self::parse_decimal(&quote.price)
            .ok_or_else(|| CollectError::SymbolNotFound(symbol.to_string()))?;

        let percent_change = Self::parse_percent(&quote.change_percent).unwrap_or(Decimal::ZERO);

        // Prefer the caller's symbol; the echoed one may carry an exchange suffix
        let mut record = UnifiedRecord::new(
            quote.symbol.as_deref().unwrap_or(symbol),
            price,
            percent_change,
            PROVIDER_ID,
        );
        record.symbol = symbol.to_string();
        record.open = Self::parse_decimal(&quote.open);
        record.high = Self::parse_decimal(&quote.high);
        record.low = Self::parse_decimal(&quote.low);
        record.previous_close = Self::parse_decimal(&quote.previous_close);
        record.change = Self::parse_decimal(&quote.change);
        record.volume = Self::parse_decimal(&quote.volume);

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_global_quote_parsing() {
        let body = r#"{
            "Global Quote": {
                "01. symbol": "IBM",
                "02. open": "140.00",
                "03. high": "142.50",
                "04. low": "139.75",
                "05. price": "141.20",
                "06. volume": "3500000",
                "07. latest trading day": "2024-06-14",
                "08. previous close": "139.90",
                "09. change": "1.30",
                "10. change percent": "0.9292%"
            }
        }"#;

        let response: GlobalQuoteResponse = serde_json::from_str(body).unwrap();
        let quote = response.quote.unwrap();

        assert_eq!(
            AlphaVantageProvider::parse_decimal(&quote.price),
            Some(dec!(141.20))
        );
        assert_eq!(
            AlphaVantageProvider::parse_percent(&quote.change_percent),
            Some(dec!(0.9292))
        );
    }

    #[test]
    fn test_rate_limit_note_detected() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 25 requests per day."}"#;
        let response: GlobalQuoteResponse = serde_json::from_str(body).unwrap();

        let result = AlphaVantageProvider::check_api_error(&response);
        assert!(matches!(result, Err(CollectError::RateLimited { .. })));
    }

    #[test]
    fn test_invalid_call_maps_to_symbol_not_found() {
        let body = r#"{"Error Message": "Invalid API call. Please retry with a valid symbol."}"#;
        let response: GlobalQuoteResponse = serde_json::from_str(body).unwrap();

        let result = AlphaVantageProvider::check_api_error(&response);
        assert!(matches!(result, Err(CollectError::SymbolNotFound(_))));
    }

    #[test]
    fn test_empty_envelope_means_unknown_symbol() {
        let body = r#"{"Global Quote": {}}"#;
        let response: GlobalQuoteResponse = serde_json::from_str(body).unwrap();

        assert!(AlphaVantageProvider::check_api_error(&response).is_ok());
        let quote = response.quote.unwrap();
        assert!(AlphaVantageProvider::parse_decimal(&quote.price).is_none());
    }
}
