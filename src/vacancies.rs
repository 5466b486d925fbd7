use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::aggregator::RunReport;
use crate::job_store::MAX_LIMIT;
use crate::models::Vacancy;
use crate::server::AppState;
use crate::sink::VacancyFilter;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    sources: Vec<String>,
    timestamp: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sources: state.aggregator.source_tags(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Deserialize)]
pub struct SearchInput {
    query: String,
    city: Option<String>,
    limit: Option<usize>,
}

/// Runs one aggregated search immediately, outside the scheduler.
pub async fn search_handler(
    State(state): State<AppState>,
    Json(input): Json<SearchInput>,
) -> Result<Json<RunReport>, (StatusCode, String)> {
    let query = input.query.trim();
    let limit = input.limit.unwrap_or(20);

    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query cannot be empty.".into()));
    }

    if limit < 1 || limit > MAX_LIMIT {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("limit must be between 1 and {}.", MAX_LIMIT),
        ));
    }

    let city = input
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let report = state.aggregator.aggregate(query, city, limit).await;

    Ok(Json(report))
}

#[derive(Serialize)]
struct VacancyDto {
    id: i32,
    title: String,
    company: String,
    salary: String,
    link: String,
    source: String,
    created_at: String,
}

fn transform_vacancy(vacancy: Vacancy) -> VacancyDto {
    VacancyDto {
        id: vacancy.id,
        title: vacancy.title,
        company: vacancy.company,
        salary: vacancy.salary,
        link: vacancy.link,
        source: vacancy.source,
        created_at: vacancy.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

#[derive(Deserialize)]
pub struct ListVacanciesQuery {
    page: Option<i64>,
    per_page: Option<i64>,
    source: Option<String>,
    company: Option<String>,
}

#[derive(Serialize)]
struct Pagination {
    page: i64,
    per_page: i64,
    total: i64,
    pages: i64,
}

#[derive(Serialize)]
pub struct ListVacanciesResponse {
    vacancies: Vec<VacancyDto>,
    pagination: Pagination,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn list_vacancies_handler(
    State(state): State<AppState>,
    Query(query): Query<ListVacanciesQuery>,
) -> Result<Json<ListVacanciesResponse>, (StatusCode, String)> {
    let filter = VacancyFilter {
        source: non_blank(query.source),
        company: non_blank(query.company),
    };

    let page = state
        .sink
        .list(&filter, query.page.unwrap_or(1), query.per_page.unwrap_or(10))
        .map_err(|e| {
            log::error!("Failed to fetch vacancies. {}", e);

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch vacancies.".to_string(),
            )
        })?;

    Ok(Json(ListVacanciesResponse {
        pagination: Pagination {
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            pages: page.pages,
        },
        vacancies: page.vacancies.into_iter().map(transform_vacancy).collect(),
    }))
}

#[derive(Serialize)]
pub struct DbStatsResponse {
    total_vacancies: i64,
    by_source: BTreeMap<String, i64>,
}

pub async fn db_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<DbStatsResponse>, (StatusCode, String)> {
    match state.sink.stats() {
        Ok(stats) => Ok(Json(DbStatsResponse {
            total_vacancies: stats.total,
            by_source: stats.by_source,
        })),
        Err(e) => {
            log::error!("Failed to compute vacancy stats. {}", e);

            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to compute stats.".into(),
            ))
        }
    }
}

#[derive(Serialize)]
pub struct ClearDbResponse {
    deleted_count: usize,
}

pub async fn clear_db_handler(
    State(state): State<AppState>,
) -> Result<Json<ClearDbResponse>, (StatusCode, String)> {
    match state.sink.clear() {
        Ok(deleted_count) => Ok(Json(ClearDbResponse { deleted_count })),
        Err(e) => {
            log::error!("Failed to clear vacancies. {}", e);

            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to clear vacancies.".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_state;
    use tempfile::TempDir;

    #[tokio::test]
    async fn search_stores_results_and_stats_reflect_them() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let Json(report) = search_handler(
            State(state.clone()),
            Json(SearchInput {
                query: " rust ".into(),
                city: Some("".into()),
                limit: Some(3),
            }),
        )
        .await
        .unwrap();

        assert_eq!(report.query, "rust");
        assert_eq!(report.total, 3);
        assert_eq!(report.inserted, 3);

        let Json(stats) = db_stats_handler(State(state.clone())).await.unwrap();
        assert_eq!(stats.total_vacancies, 3);

        let Json(listed) = list_vacancies_handler(
            State(state.clone()),
            Query(ListVacanciesQuery {
                page: None,
                per_page: Some(2),
                source: Some("alpha".into()),
                company: Some(" ".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(listed.pagination.total, 3);
        assert_eq!(listed.pagination.pages, 2);
        assert_eq!(listed.vacancies.len(), 2);

        let Json(cleared) = clear_db_handler(State(state)).await.unwrap();
        assert_eq!(cleared.deleted_count, 3);
    }

    #[tokio::test]
    async fn search_rejects_empty_query() {
        let dir = TempDir::new().unwrap();

        let result = search_handler(
            State(test_state(&dir)),
            Json(SearchInput {
                query: "   ".into(),
                city: None,
                limit: None,
            }),
        )
        .await;

        assert_eq!(result.err().unwrap().0, StatusCode::BAD_REQUEST);
    }
}
