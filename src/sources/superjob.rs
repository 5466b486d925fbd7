use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::Source;
use crate::error::SourceError;
use crate::models::{Listing, NOT_SPECIFIED};

const TAG: &str = "superjob";
const MAX_PER_PAGE: usize = 20;
const PAGE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct VacanciesResponse {
    #[serde(default)]
    objects: Vec<VacancyObject>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct VacancyObject {
    profession: Option<String>,
    firm_name: Option<String>,
    link: Option<String>,
    payment_from: Option<i64>,
    payment_to: Option<i64>,
    currency: Option<String>,
}

/// Queries the SuperJob vacancies API.
pub struct SuperJobSource {
    client: reqwest::Client,
    api_url: String,
    secret: Option<String>,
}

impl SuperJobSource {
    pub fn new(client: reqwest::Client, api_url: &str, secret: Option<String>) -> Self {
        SuperJobSource {
            client,
            api_url: api_url.to_string(),
            secret,
        }
    }

    async fn fetch_page(
        &self,
        secret: &str,
        keyword: &str,
        page: usize,
        count: usize,
    ) -> Result<VacanciesResponse, SourceError> {
        let response = self
            .client
            .get(&self.api_url)
            .header("X-Api-App-Id", secret)
            .query(&[
                ("keyword", keyword.to_string()),
                ("page", page.to_string()),
                ("count", count.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: self.api_url.clone(),
            });
        }

        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Source for SuperJobSource {
    fn tag(&self) -> &str {
        TAG
    }

    async fn search(
        &self,
        query: &str,
        city: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Listing>, SourceError> {
        let Some(secret) = self.secret.as_deref() else {
            return Err(SourceError::NotConfigured("SuperJob API key".into()));
        };

        // The API has no separate town filter that accepts free text.
        let keyword = match city {
            Some(city) => format!("{} {}", query, city),
            None => query.to_string(),
        };
        let per_page = limit.clamp(1, MAX_PER_PAGE);

        let mut listings = Vec::new();
        let mut page = 0;

        while listings.len() < limit {
            if page > 0 {
                tokio::time::sleep(PAGE_DELAY).await;
            }

            let response = self.fetch_page(secret, &keyword, page, per_page).await?;
            if response.objects.is_empty() {
                break;
            }

            let remaining = limit - listings.len();
            listings.extend(response.objects.into_iter().take(remaining).map(into_listing));

            if !response.more {
                break;
            }
            page += 1;
        }

        log::debug!("superjob: {} listings for {:?}", listings.len(), keyword);

        Ok(listings)
    }
}

fn format_salary(object: &VacancyObject) -> String {
    let mut parts = Vec::new();

    if let Some(from) = object.payment_from.filter(|amount| *amount > 0) {
        parts.push(format!("from {}", from));
    }
    if let Some(to) = object.payment_to.filter(|amount| *amount > 0) {
        parts.push(format!("to {}", to));
    }
    if parts.is_empty() {
        return NOT_SPECIFIED.to_string();
    }
    if let Some(currency) = object.currency.as_deref().filter(|c| !c.is_empty()) {
        parts.push(currency.to_string());
    }

    parts.join(" ")
}

fn into_listing(object: VacancyObject) -> Listing {
    let salary = format_salary(&object);

    Listing {
        title: object.profession.unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        company: object.firm_name.unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        salary,
        link: object.link.unwrap_or_default(),
        source: TAG.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_api_page() {
        let body = r#"{
            "objects": [
                {"profession": "Rust developer", "firm_name": "Acme",
                 "link": "https://www.superjob.ru/vakansii/rust-1.html",
                 "payment_from": 200000, "payment_to": 300000, "currency": "rub"},
                {"profession": "QA engineer", "firm_name": null,
                 "link": "https://www.superjob.ru/vakansii/qa-2.html",
                 "payment_from": 0, "payment_to": 0, "currency": "rub"}
            ],
            "more": true,
            "total": 2
        }"#;

        let response: VacanciesResponse = serde_json::from_str(body).unwrap();
        assert!(response.more);

        let listings: Vec<Listing> = response.objects.into_iter().map(into_listing).collect();

        assert_eq!(listings[0].title, "Rust developer");
        assert_eq!(listings[0].salary, "from 200000 to 300000 rub");
        assert_eq!(listings[0].source, "superjob");
        assert_eq!(listings[1].company, NOT_SPECIFIED);
        assert_eq!(listings[1].salary, NOT_SPECIFIED);
    }

    #[test]
    fn salary_with_only_upper_bound() {
        let object = VacancyObject {
            profession: None,
            firm_name: None,
            link: None,
            payment_from: None,
            payment_to: Some(150000),
            currency: Some("rub".into()),
        };

        assert_eq!(format_salary(&object), "to 150000 rub");
    }

    #[tokio::test]
    async fn missing_secret_is_a_source_error() {
        let source = SuperJobSource::new(reqwest::Client::new(), "http://127.0.0.1:9/", None);

        let result = source.search("rust", None, 10).await;

        assert!(matches!(result, Err(SourceError::NotConfigured(_))));
    }
}
