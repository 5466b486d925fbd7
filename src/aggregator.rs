use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::Listing;
use crate::sink::ListingSink;
use crate::sources::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub count: usize,
    pub status: SourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    pub fn success(count: usize) -> Self {
        SourceReport {
            count,
            status: SourceStatus::Success,
            error: None,
        }
    }

    pub fn failure(detail: String) -> Self {
        SourceReport {
            count: 0,
            status: SourceStatus::Error,
            error: Some(detail),
        }
    }
}

/// Outcome of one aggregated search.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub query: String,
    /// Listings handed to the sink, new or not.
    pub total: usize,
    /// Listings the sink stored for the first time.
    pub inserted: usize,
    pub per_source: BTreeMap<String, SourceReport>,
    pub listings: Vec<Listing>,
}

/// Fans one query out to every source and feeds the merged result to the sink.
pub struct SearchAggregator {
    sources: Vec<Arc<dyn Source>>,
    sink: Arc<dyn ListingSink>,
}

impl SearchAggregator {
    /// Tags key the per-source report, so each must be unique.
    pub fn new(
        sources: Vec<Arc<dyn Source>>,
        sink: Arc<dyn ListingSink>,
    ) -> Result<Self, ConfigError> {
        let mut tags = BTreeSet::new();
        for source in &sources {
            if !tags.insert(source.tag()) {
                return Err(ConfigError::DuplicateSource(source.tag().to_string()));
            }
        }

        Ok(SearchAggregator { sources, sink })
    }

    pub fn source_tags(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.tag().to_string()).collect()
    }

    /// Never fails: a source error only marks that source's entry as failed.
    /// Sources are called one after another, in configuration order.
    pub async fn aggregate(&self, query: &str, city: Option<&str>, limit: usize) -> RunReport {
        let mut per_source = BTreeMap::new();
        let mut listings = Vec::new();

        for source in &self.sources {
            let tag = source.tag().to_string();

            match source.search(query, city, limit).await {
                Ok(found) => {
                    log::info!("{}: {} vacancies for {:?}", tag, found.len(), query);
                    per_source.insert(tag, SourceReport::success(found.len()));
                    listings.extend(found);
                }
                Err(e) => {
                    log::warn!("{} search for {:?} failed. {}", tag, query, e);
                    per_source.insert(tag, SourceReport::failure(e.to_string()));
                }
            }
        }

        let inserted = self.store_batch(&listings).await;

        log::info!(
            "Search {:?} finished: {} vacancies, {} new.",
            query,
            listings.len(),
            inserted
        );

        RunReport {
            query: query.to_string(),
            total: listings.len(),
            inserted,
            per_source,
            listings,
        }
    }

    /// Saves on the blocking pool. A panic in the sink is re-raised so the
    /// caller sees it as it would a panic from a source.
    async fn store_batch(&self, listings: &[Listing]) -> usize {
        if listings.is_empty() {
            return 0;
        }

        let sink = Arc::clone(&self.sink);
        let batch = listings.to_vec();
        let saved = tokio::task::spawn_blocking(move || {
            batch.iter().filter(|listing| sink.save(listing)).count()
        })
        .await;

        match saved {
            Ok(inserted) => inserted,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                log::error!("Saving {} vacancies was interrupted. {}", listings.len(), e);
                0
            }
        }
    }
}
