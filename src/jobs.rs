use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::job_store::{Job, JobSpec, JobStatus, RunSummary};
use crate::scheduler::{StartOutcome, StopOutcome};
use crate::server::AppState;

const DEFAULT_INTERVAL_MINUTES: i64 = 60;
const DEFAULT_LIMIT: i64 = 20;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Serialize)]
struct JobDto {
    keywords: Vec<String>,
    city: Option<String>,
    limit: usize,
    interval_minutes: u32,
    status: JobStatus,
    next_run: String,
    last_run: Option<String>,
    run_count: u64,
    total_found: u64,
    last_error: Option<String>,
    last_result: Option<RunSummary>,
}

fn transform_job(job: Job) -> JobDto {
    JobDto {
        keywords: job.keywords,
        city: job.city,
        limit: job.limit,
        interval_minutes: job.interval_minutes,
        status: job.status,
        next_run: job.next_run.format(TIME_FORMAT).to_string(),
        last_run: job.last_run.map(|t| t.format(TIME_FORMAT).to_string()),
        run_count: job.run_count,
        total_found: job.total_found,
        last_error: job.last_error,
        last_result: job.last_result,
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    running: bool,
    jobs: BTreeMap<String, JobDto>,
    total_jobs: usize,
}

pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.scheduler.snapshot().await;

    let total_jobs = snapshot.jobs.len();
    let jobs = snapshot
        .jobs
        .into_iter()
        .map(|(id, job)| (id, transform_job(job)))
        .collect();

    Json(StatusResponse {
        running: snapshot.running,
        jobs,
        total_jobs,
    })
}

#[derive(Serialize)]
pub struct StartResponse {
    status: StartOutcome,
}

pub async fn start_handler(State(state): State<AppState>) -> Json<StartResponse> {
    let status = state.scheduler.start().await;

    Json(StartResponse { status })
}

#[derive(Serialize)]
pub struct StopResponse {
    status: StopOutcome,
}

pub async fn stop_handler(State(state): State<AppState>) -> Json<StopResponse> {
    let status = state.scheduler.stop().await;

    Json(StopResponse { status })
}

/// Keywords as a JSON list or as one string with a keyword per line.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum KeywordsInput {
    List(Vec<String>),
    Lines(String),
}

impl KeywordsInput {
    fn into_keywords(self) -> Vec<String> {
        match self {
            KeywordsInput::List(keywords) => keywords,
            KeywordsInput::Lines(text) => text.lines().map(String::from).collect(),
        }
    }
}

#[derive(Deserialize)]
pub struct AddJobInput {
    keywords: KeywordsInput,
    interval_minutes: Option<i64>,
    city: Option<String>,
    limit: Option<i64>,
    run_immediately: Option<bool>,
}

#[derive(Serialize)]
pub struct AddJobResponse {
    job_id: String,
    keywords_count: usize,
    interval_minutes: u32,
    city: Option<String>,
    limit: usize,
}

pub async fn add_job_handler(
    State(state): State<AppState>,
    Json(input): Json<AddJobInput>,
) -> Result<Json<AddJobResponse>, (StatusCode, String)> {
    let interval = input.interval_minutes.unwrap_or(DEFAULT_INTERVAL_MINUTES);
    let limit = input.limit.unwrap_or(DEFAULT_LIMIT);

    if interval < 1 {
        return Err(ControlError::IntervalTooShort.into());
    }

    let spec = JobSpec::new(
        input.keywords.into_keywords(),
        input.city,
        usize::try_from(limit).unwrap_or(0),
        u32::try_from(interval).unwrap_or(u32::MAX),
        input.run_immediately.unwrap_or(false),
    )?;

    let job_id = state.scheduler.add_job(spec).await;

    let job = state.scheduler.job(&job_id).await.ok_or_else(|| {
        log::error!("Job {} vanished right after it was added.", job_id);

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch job.".to_string(),
        )
    })?;

    Ok(Json(AddJobResponse {
        job_id,
        keywords_count: job.keywords.len(),
        interval_minutes: job.interval_minutes,
        city: job.city,
        limit: job.limit,
    }))
}

#[derive(Serialize)]
pub struct RemoveJobResponse {
    removed: String,
}

pub async fn remove_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RemoveJobResponse>, (StatusCode, String)> {
    state.scheduler.remove_job(&id).await?;

    Ok(Json(RemoveJobResponse { removed: id }))
}

#[derive(Serialize)]
pub struct JobIdResponse {
    job_id: String,
    status: String,
}

pub async fn run_job_now_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobIdResponse>, (StatusCode, String)> {
    state.scheduler.run_job_now(&id).await?;

    log::info!("Job {} marked to run on the next poll.", id);

    Ok(Json(JobIdResponse {
        job_id: id,
        status: "scheduled".into(),
    }))
}

pub async fn disable_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobIdResponse>, (StatusCode, String)> {
    state
        .scheduler
        .set_job_status(&id, JobStatus::Disabled)
        .await?;

    Ok(Json(JobIdResponse {
        job_id: id,
        status: "disabled".into(),
    }))
}

pub async fn enable_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobIdResponse>, (StatusCode, String)> {
    state.scheduler.set_job_status(&id, JobStatus::Active).await?;

    Ok(Json(JobIdResponse {
        job_id: id,
        status: "active".into(),
    }))
}

#[derive(Serialize)]
pub struct ClearJobsResponse {
    deleted_count: usize,
}

pub async fn clear_all_jobs_handler(State(state): State<AppState>) -> Json<ClearJobsResponse> {
    let deleted_count = state.scheduler.clear_jobs().await;

    Json(ClearJobsResponse { deleted_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_state;
    use tempfile::TempDir;

    fn input(json: serde_json::Value) -> Json<AddJobInput> {
        Json(serde_json::from_value(json).unwrap())
    }

    #[tokio::test]
    async fn add_job_accepts_newline_separated_keywords() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let Json(response) = add_job_handler(
            State(state.clone()),
            input(serde_json::json!({
                "keywords": "rust developer\n\n  go developer \n",
                "interval_minutes": 30,
                "city": "Moscow"
            })),
        )
        .await
        .unwrap();

        assert_eq!(response.keywords_count, 2);
        assert_eq!(response.interval_minutes, 30);
        assert_eq!(response.limit, 20);

        let Json(status) = status_handler(State(state)).await;
        assert_eq!(status.total_jobs, 1);
        assert_eq!(
            status.jobs[&response.job_id].keywords,
            vec!["rust developer", "go developer"]
        );
    }

    #[tokio::test]
    async fn add_job_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let empty = add_job_handler(
            State(state.clone()),
            input(serde_json::json!({ "keywords": [] })),
        )
        .await;
        assert_eq!(empty.err().unwrap().0, StatusCode::BAD_REQUEST);

        let short = add_job_handler(
            State(state.clone()),
            input(serde_json::json!({ "keywords": ["rust"], "interval_minutes": 0 })),
        )
        .await;
        let (code, message) = short.err().unwrap();
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(message.contains("interval_minutes"));

        let Json(status) = status_handler(State(state)).await;
        assert_eq!(status.total_jobs, 0);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let removed =
            remove_job_handler(State(state.clone()), Path("nope".to_string())).await;
        assert_eq!(removed.err().unwrap().0, StatusCode::NOT_FOUND);

        let run_now = run_job_now_handler(State(state), Path("nope".to_string())).await;
        assert_eq!(run_now.err().unwrap().0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_stop_report_transitions() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let Json(first) = start_handler(State(state.clone())).await;
        let Json(second) = start_handler(State(state.clone())).await;
        assert_eq!(first.status, StartOutcome::Started);
        assert_eq!(second.status, StartOutcome::AlreadyRunning);

        let Json(stopped) = stop_handler(State(state.clone())).await;
        let Json(again) = stop_handler(State(state)).await;
        assert_eq!(stopped.status, StopOutcome::Stopped);
        assert_eq!(again.status, StopOutcome::AlreadyStopped);
    }

    #[tokio::test]
    async fn clear_all_jobs_counts_deleted() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        for keyword in ["rust", "go"] {
            add_job_handler(
                State(state.clone()),
                input(serde_json::json!({ "keywords": [keyword] })),
            )
            .await
            .unwrap();
        }

        let Json(cleared) = clear_all_jobs_handler(State(state)).await;

        assert_eq!(cleared.deleted_count, 2);
    }
}
