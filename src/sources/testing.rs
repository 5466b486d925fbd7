use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::Source;
use crate::error::SourceError;
use crate::models::Listing;

pub fn listings(source: &str, count: usize) -> Vec<Listing> {
    (0..count)
        .map(|i| Listing {
            title: format!("{} vacancy {}", source, i),
            company: "Acme".into(),
            salary: crate::models::NOT_SPECIFIED.into(),
            link: format!("https://{}.example/vacancy/{}", source, i),
            source: source.into(),
        })
        .collect()
}

/// Returns a fixed batch (capped at `limit`) and counts its calls.
pub struct StaticSource {
    tag: String,
    listings: Vec<Listing>,
    delay: Option<Duration>,
    pub calls: Arc<AtomicUsize>,
    pub limits: std::sync::Mutex<Vec<usize>>,
}

impl StaticSource {
    pub fn new(tag: &str, count: usize) -> Self {
        StaticSource {
            tag: tag.into(),
            listings: listings(tag, count),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            limits: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_listings(tag: &str, listings: Vec<Listing>) -> Self {
        StaticSource {
            listings,
            ..StaticSource::new(tag, 0)
        }
    }

    pub fn slow(tag: &str, count: usize, delay: Duration) -> Self {
        StaticSource {
            delay: Some(delay),
            ..StaticSource::new(tag, count)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for StaticSource {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn search(
        &self,
        _query: &str,
        _city: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Listing>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.limits.lock().unwrap().push(limit);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.listings.iter().take(limit).cloned().collect())
    }
}

pub struct FailingSource {
    tag: String,
}

impl FailingSource {
    pub fn new(tag: &str) -> Self {
        FailingSource { tag: tag.into() }
    }
}

#[async_trait]
impl Source for FailingSource {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn search(
        &self,
        _query: &str,
        _city: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<Listing>, SourceError> {
        Err(SourceError::Status {
            status: 502,
            url: format!("https://{}.example/search", self.tag),
        })
    }
}

/// Panics on every call, standing in for a bug that escapes error handling.
pub struct PanickingSource {
    pub calls: Arc<AtomicUsize>,
}

impl PanickingSource {
    pub fn new() -> Self {
        PanickingSource {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Source for PanickingSource {
    fn tag(&self) -> &str {
        "broken"
    }

    async fn search(
        &self,
        _query: &str,
        _city: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<Listing>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("adapter bug");
    }
}
