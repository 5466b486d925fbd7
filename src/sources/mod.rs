//! Job-site adapters.
//!
//! Each adapter turns one query into candidate listings for its site. Adapters
//! are stateless per call and fail independently of each other; timeouts are
//! applied by their HTTP clients.

mod hh;
mod superjob;

#[cfg(test)]
pub mod testing;

pub use hh::HhSource;
pub use superjob::SuperJobSource;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::SourceError;
use crate::models::Listing;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[async_trait]
pub trait Source: Send + Sync {
    /// Tag stored on every listing this source produces.
    fn tag(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        city: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Listing>, SourceError>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;

    Ok(client)
}

/// The configured sources, in the order their results are merged.
pub fn configured_sources(config: &Config) -> Result<Vec<Arc<dyn Source>>, SourceError> {
    let client = http_client(config.source_timeout)?;

    let hh = HhSource::new(client.clone(), &config.hh_base_url);
    let superjob = SuperJobSource::new(
        client,
        &config.superjob_api_url,
        config.superjob_secret.clone(),
    );

    if config.superjob_secret.is_none() {
        log::warn!("SUPERJOB_SECRET is not set, superjob searches will report an error.");
    }

    Ok(vec![Arc::new(hh), Arc::new(superjob)])
}
