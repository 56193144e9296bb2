//! Finnhub snapshot provider.
//!
//! Fetches current quotes via the /quote endpoint. The free tier is limited
//! to 60 API calls per minute; 429 and 403 responses are surfaced as
//! rate-limit errors so the adaptive limiter backs off.
//! API documentation: https://finnhub.io/docs/api

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::CollectError;
use crate::models::UnifiedRecord;
use crate::provider::{CallBudget, SnapshotProvider};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: &str = "FINNHUB";

/// Response from the /quote endpoint.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Absolute change
    d: Option<f64>,
    /// Percent change
    dp: Option<f64>,
    /// High price of the day
    h: Option<f64>,
    /// Low price of the day
    l: Option<f64>,
    /// Open price of the day
    o: Option<f64>,
    /// Previous close
    pc: Option<f64>,
}

/// Error payload Finnhub returns alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

/// Finnhub snapshot provider.
pub struct FinnhubProvider {
    client: Client,
    api_key: String,
}

impl FinnhubProvider {
    /// Create a new Finnhub provider with the given API key.
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, api_key }
    }

    /// Make a GET request to the Finnhub API.
    async fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, CollectError> {
        let url = format!("{}{}", BASE_URL, endpoint);

        let mut request = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key);

        for (key, value) in params {
            request = request.query(&[(key, value)]);
        }

        debug!("Finnhub request: {} with {} params", endpoint, params.len());

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CollectError::Timeout {
                    provider: PROVIDER_ID.to_string(),
                }
            } else {
                CollectError::ProviderError {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("Request failed: {}", e),
                }
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CollectError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CollectError::AuthenticationFailed {
                provider: PROVIDER_ID.to_string(),
                message: "Invalid or missing API key".to_string(),
            });
        }

        // Finnhub uses 403 for exhausted quota as well as plan restrictions
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(CollectError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(&body) {
                if let Some(error_msg) = error_resp.error {
                    return Err(CollectError::ProviderError {
                        provider: PROVIDER_ID.to_string(),
                        message: error_msg,
                    });
                }
            }

            return Err(CollectError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {} - {}", status, body),
            });
        }

        response
            .text()
            .await
            .map_err(|e| CollectError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to read response: {}", e),
            })
    }

    fn to_decimal(value: Option<f64>) -> Option<Decimal> {
        value.and_then(|v| Decimal::from_str(&v.to_string()).ok())
    }
}

#[async_trait]
impl SnapshotProvider for FinnhubProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        5
    }

    fn budget(&self) -> CallBudget {
        CallBudget {
            calls_per_minute: 60,
            calls_per_day: 86_400,
            base_delay: Duration::from_millis(1100),
        }
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<UnifiedRecord, CollectError> {
        let body = self.fetch("/quote", &[("symbol", symbol)]).await?;

        let quote: QuoteResponse =
            serde_json::from_str(&body).map_err(|e| CollectError::ValidationFailed {
                message: format!("Malformed quote payload for '{}': {}", symbol, e),
            })?;

        // Finnhub returns an all-zero/null quote body for unknown symbols
        let price = match Self::to_decimal(quote.c) {
            Some(p) if p > Decimal::ZERO => p,
            _ => return Err(CollectError::SymbolNotFound(symbol.to_string())),
        };

        let percent_change = Self::to_decimal(quote.dp).unwrap_or(Decimal::ZERO);

        let mut record = UnifiedRecord::new(symbol, price, percent_change, PROVIDER_ID);
        record.open = Self::to_decimal(quote.o);
        record.high = Self::to_decimal(quote.h);
        record.low = Self::to_decimal(quote.l);
        record.previous_close = Self::to_decimal(quote.pc);
        record.change = Self::to_decimal(quote.d);

        Ok(record)
    }
}
