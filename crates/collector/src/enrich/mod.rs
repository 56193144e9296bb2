//! Best-effort market context enrichment.
//!
//! Enrichment sources contribute news headlines and earnings-calendar
//! entries to a successful collection. They are strictly best-effort: a
//! failing source logs a warning and contributes nothing, it never fails
//! or delays the collection outcome beyond its own fetch.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use crate::errors::CollectError;
use crate::models::MarketEnrichment;

/// One source of secondary market context.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &'static str;

    /// Fetch this source's contribution.
    async fn enrich(&self) -> Result<MarketEnrichment, CollectError>;
}

/// Gather and merge contributions from every source.
///
/// Returns `None` when no source produced anything, so callers can leave
/// the result's enrichment field unset instead of attaching empty lists.
pub async fn gather(sources: &[Arc<dyn EnrichmentSource>]) -> Option<MarketEnrichment> {
    let mut merged = MarketEnrichment::default();

    for source in sources {
        match source.enrich().await {
            Ok(contribution) => {
                debug!(
                    "Enrichment: '{}' contributed {} headlines, {} calendar entries",
                    source.id(),
                    contribution.news.len(),
                    contribution.calendar.len()
                );
                merged.news.extend(contribution.news);
                merged.calendar.extend(contribution.calendar);
            }
            Err(error) => {
                warn!("Enrichment: '{}' failed: {}", source.id(), error);
            }
        }
    }

    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Headline;

    struct FixedSource {
        titles: Vec<&'static str>,
    }

    #[async_trait]
    impl EnrichmentSource for FixedSource {
        fn id(&self) -> &'static str {
            "FIXED"
        }

        async fn enrich(&self) -> Result<MarketEnrichment, CollectError> {
            Ok(MarketEnrichment {
                news: self
                    .titles
                    .iter()
                    .map(|t| Headline {
                        title: t.to_string(),
                        source: "FIXED".to_string(),
                        url: None,
                    })
                    .collect(),
                calendar: Vec::new(),
            })
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl EnrichmentSource for BrokenSource {
        fn id(&self) -> &'static str {
            "BROKEN"
        }

        async fn enrich(&self) -> Result<MarketEnrichment, CollectError> {
            Err(CollectError::Timeout {
                provider: "BROKEN".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_merges_across_sources() {
        let sources: Vec<Arc<dyn EnrichmentSource>> = vec![
            Arc::new(FixedSource {
                titles: vec!["markets rally"],
            }),
            Arc::new(FixedSource {
                titles: vec!["rates unchanged", "tech earnings ahead"],
            }),
        ];

        let merged = gather(&sources).await.unwrap();
        assert_eq!(merged.news.len(), 3);
    }

    #[tokio::test]
    async fn test_failing_source_contributes_nothing() {
        let sources: Vec<Arc<dyn EnrichmentSource>> = vec![
            Arc::new(BrokenSource),
            Arc::new(FixedSource {
                titles: vec!["markets rally"],
            }),
        ];

        // The failure is swallowed, the healthy source still lands
        let merged = gather(&sources).await.unwrap();
        assert_eq!(merged.news.len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_collected_yields_none() {
        let sources: Vec<Arc<dyn EnrichmentSource>> = vec![Arc::new(BrokenSource)];
        assert!(gather(&sources).await.is_none());
    }
}
