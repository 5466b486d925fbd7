use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use vacancy_harvester::error::SourceError;
use vacancy_harvester::models::Listing;
use vacancy_harvester::sources::Source;

pub struct FixedSource {
    pub tag: &'static str,
    pub count: usize,
    pub calls: Arc<AtomicUsize>,
}

impl FixedSource {
    pub fn new(tag: &'static str, count: usize) -> Self {
        FixedSource {
            tag,
            count,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Source for FixedSource {
    fn tag(&self) -> &str {
        self.tag
    }

    async fn search(
        &self,
        query: &str,
        _city: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Listing>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        Ok((0..self.count.min(limit))
            .map(|i| Listing {
                title: format!("{} #{}", query, i),
                company: "Acme".into(),
                salary: "from 100000 rub".into(),
                link: format!("https://{}.example/vacancy/{}", self.tag, i),
                source: self.tag.into(),
            })
            .collect())
    }
}

pub struct DownSource {
    pub tag: &'static str,
}

#[async_trait]
impl Source for DownSource {
    fn tag(&self) -> &str {
        self.tag
    }

    async fn search(
        &self,
        _query: &str,
        _city: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<Listing>, SourceError> {
        Err(SourceError::Status {
            status: 503,
            url: format!("https://{}.example/api", self.tag),
        })
    }
}

pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
