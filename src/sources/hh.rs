use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use super::Source;
use crate::error::SourceError;
use crate::models::{Listing, NOT_SPECIFIED};

const TAG: &str = "hh";
const MAX_PER_PAGE: usize = 50;

const ITEM_SELECTOR: &str = r#"div[data-qa="vacancy-serp__vacancy"]"#;
const TITLE_SELECTOR: &str = r#"a[data-qa="serp-item__title"]"#;
const EMPLOYER_SELECTOR: &str = r#"[data-qa="vacancy-serp__vacancy-employer"]"#;
const SALARY_SELECTOR: &str = r#"span[data-qa="vacancy-serp__vacancy-compensation"]"#;

/// Scrapes the hh.ru search results page.
pub struct HhSource {
    client: reqwest::Client,
    base_url: String,
}

impl HhSource {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        HhSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_page(
        &self,
        query: &str,
        city: Option<&str>,
        limit: usize,
    ) -> Result<String, SourceError> {
        let url = format!("{}/search/vacancy", self.base_url);
        let per_page = limit.min(MAX_PER_PAGE).to_string();

        let mut params = vec![("text", query), ("per_page", per_page.as_str())];
        if let Some(area) = city {
            params.push(("area", area));
        }

        let response = self.client.get(&url).query(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl Source for HhSource {
    fn tag(&self) -> &str {
        TAG
    }

    async fn search(
        &self,
        query: &str,
        city: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Listing>, SourceError> {
        let body = self.fetch_page(query, city, limit).await?;

        let listings = parse_listings(&body, &self.base_url, limit)?;

        log::debug!("hh: {} listings for {:?}", listings.len(), query);

        Ok(listings)
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Parse(format!("bad selector {}: {}", css, e)))
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts up to `limit` listings from a search results page.
///
/// Items without a title link are skipped rather than failing the page.
fn parse_listings(html: &str, base_url: &str, limit: usize) -> Result<Vec<Listing>, SourceError> {
    let document = Html::parse_document(html);
    let item_selector = selector(ITEM_SELECTOR)?;
    let title_selector = selector(TITLE_SELECTOR)?;
    let employer_selector = selector(EMPLOYER_SELECTOR)?;
    let salary_selector = selector(SALARY_SELECTOR)?;

    let mut listings = Vec::new();

    for item in document.select(&item_selector) {
        if listings.len() >= limit {
            break;
        }

        let Some(title_link) = item.select(&title_selector).next() else {
            continue;
        };
        let Some(href) = title_link.value().attr("href") else {
            continue;
        };

        let link = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", base_url, href)
        };

        let company = item
            .select(&employer_selector)
            .next()
            .map(text_of)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| NOT_SPECIFIED.to_string());

        let salary = item
            .select(&salary_selector)
            .next()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| NOT_SPECIFIED.to_string());

        listings.push(Listing {
            title: text_of(title_link),
            company,
            salary,
            link,
            source: TAG.to_string(),
        });
    }

    Ok(listings)
}
