use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::aggregator::SearchAggregator;
use crate::jobs::{
    add_job_handler, clear_all_jobs_handler, disable_job_handler, enable_job_handler,
    remove_job_handler, run_job_now_handler, start_handler, status_handler, stop_handler,
};
use crate::scheduler::Scheduler;
use crate::sink::SqliteSink;
use crate::vacancies::{
    clear_db_handler, db_stats_handler, health_handler, list_vacancies_handler, search_handler,
};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub aggregator: Arc<SearchAggregator>,
    pub sink: Arc<SqliteSink>,
}

pub fn router(state: AppState) -> Router {
    let scheduler = Router::new()
        .route("/status", get(status_handler))
        .route("/start", post(start_handler))
        .route("/stop", post(stop_handler))
        .route("/add-job", post(add_job_handler))
        .route("/remove-job/:id", delete(remove_job_handler))
        .route("/run-job-now/:id", post(run_job_now_handler))
        .route("/clear-all-jobs", delete(clear_all_jobs_handler))
        .route("/jobs/:id/disable", post(disable_job_handler))
        .route("/jobs/:id/enable", post(enable_job_handler));

    let api = Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler))
        .route("/vacancies", get(list_vacancies_handler))
        .route("/db-stats", get(db_stats_handler))
        .route("/clear-db", delete(clear_db_handler));

    Router::new()
        .nest("/scheduler", scheduler)
        .nest("/api", api)
        .with_state(state)
}

#[cfg(test)]
pub fn test_state(dir: &tempfile::TempDir) -> AppState {
    use crate::job_store::JobStore;
    use crate::scheduler::SchedulerSettings;
    use crate::sources::testing::StaticSource;
    use crate::sources::Source;

    let sink = Arc::new(SqliteSink::open(":memory:").unwrap());
    let sources: Vec<Arc<dyn Source>> = vec![Arc::new(StaticSource::new("alpha", 5))];
    let aggregator = Arc::new(SearchAggregator::new(sources, sink.clone()).unwrap());
    let scheduler = Arc::new(Scheduler::new(
        JobStore::open(dir.path().join("jobs.json")),
        aggregator.clone(),
        SchedulerSettings {
            poll_interval: std::time::Duration::from_millis(20),
            ..SchedulerSettings::default()
        },
    ));

    AppState {
        scheduler,
        aggregator,
        sink,
    }
}
