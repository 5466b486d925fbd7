use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::aggregator::SearchAggregator;
use crate::error::{ControlError, JobError};
use crate::job_store::{Job, JobSpec, JobStatus, JobStore, RunSummary, SchedulerState};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// How often the loop looks for due jobs.
    pub poll_interval: Duration,
    /// Delay before retrying a job whose execution failed, capped at half
    /// the job's own interval.
    pub failure_backoff: chrono::Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            poll_interval: Duration::from_secs(10),
            failure_backoff: chrono::Duration::minutes(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

/// Splits `limit` across `parts` keywords, largest remainder first.
/// Every part gets at least one result.
pub fn split_limit(limit: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }

    let base = limit / parts;
    let remainder = limit % parts;

    (0..parts)
        .map(|i| (base + usize::from(i < remainder)).max(1))
        .collect()
}

/// Executes due jobs. Shared by the background loop and the scheduler handle.
struct JobRunner {
    store: Arc<Mutex<JobStore>>,
    aggregator: Arc<SearchAggregator>,
    settings: SchedulerSettings,
}

impl JobRunner {
    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        log::info!(
            "Scheduler loop started, polling every {:?}.",
            self.settings.poll_interval
        );

        loop {
            self.tick(&shutdown).await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        log::info!("Scheduler loop stopped.");
    }

    /// Runs every job that is due now. Returns how many were executed.
    async fn tick(&self, shutdown: &CancellationToken) -> usize {
        let now = Utc::now();
        let due = self.store.lock().await.due_jobs(now);
        let mut executed = 0;

        for job in due {
            if shutdown.is_cancelled() {
                log::info!("Shutdown requested, leaving remaining due jobs for later.");
                break;
            }

            // An earlier job in this tick may have run long enough for this
            // one to be removed, disabled or rescheduled meanwhile.
            let current = self
                .store
                .lock()
                .await
                .get(&job.id)
                .filter(|current| current.is_due(now))
                .cloned();
            let Some(job) = current else {
                continue;
            };

            self.run_job(&job).await;
            executed += 1;
        }

        executed
    }

    async fn run_job(&self, job: &Job) {
        log::info!(
            "Running job {} ({} keywords{}).",
            job.id,
            job.keywords.len(),
            job.city
                .as_deref()
                .map(|city| format!(", city {}", city))
                .unwrap_or_default()
        );
        let started = Instant::now();

        // The store lock is not held while sources are being queried.
        let outcome = self.execute(job).await;

        let finished_at = Utc::now();
        let mut store = self.store.lock().await;

        let recorded = match outcome {
            Ok(summary) => {
                log::info!(
                    "Job {} finished in {:?}: {} vacancies, {} new.",
                    job.id,
                    started.elapsed(),
                    summary.total,
                    summary.inserted
                );
                store.record_success(&job.id, job.next_run, finished_at, summary)
            }
            Err(e) => {
                let retry_at = finished_at + self.retry_delay(job);
                log::error!(
                    "Job {} failed after {:?}, retrying at {}. {}",
                    job.id,
                    started.elapsed(),
                    retry_at.format("%Y-%m-%d %H:%M:%S"),
                    e
                );
                store.record_failure(&job.id, job.next_run, retry_at, e.to_string())
            }
        };

        if recorded {
            store.flush().await;
        } else {
            log::info!("Job {} was removed while running, not rescheduling.", job.id);
        }
    }

    /// The configured backoff, at most half the job's interval and never
    /// shorter than one poll, so a failing job neither waits a full interval
    /// nor comes back on the very next tick.
    fn retry_delay(&self, job: &Job) -> chrono::Duration {
        let poll = chrono::Duration::from_std(self.settings.poll_interval)
            .unwrap_or_else(|_| chrono::Duration::zero());

        self.settings
            .failure_backoff
            .min(job.interval() / 2)
            .max(poll)
    }

    /// Searches each keyword in turn. Runs in its own task so that a panic
    /// anywhere below surfaces as a `JobError` instead of killing the loop.
    async fn execute(&self, job: &Job) -> Result<RunSummary, JobError> {
        let aggregator = Arc::clone(&self.aggregator);
        let keywords = job.keywords.clone();
        let limits = split_limit(job.limit, keywords.len());
        let city = job.city.clone();

        let task = tokio::spawn(async move {
            let mut summary = RunSummary::default();
            for (keyword, limit) in keywords.iter().zip(limits) {
                let report = aggregator.aggregate(keyword, city.as_deref(), limit).await;
                summary.absorb(&report);
            }
            summary
        });

        task.await.map_err(job_error)
    }
}

fn job_error(error: JoinError) -> JobError {
    if error.is_cancelled() {
        return JobError::Cancelled;
    }

    JobError::Panicked(panic_message(error.into_panic()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

/// Owns the job store and at most one background polling loop.
pub struct Scheduler {
    store: Arc<Mutex<JobStore>>,
    runner: Arc<JobRunner>,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    pub fn new(
        store: JobStore,
        aggregator: Arc<SearchAggregator>,
        settings: SchedulerSettings,
    ) -> Self {
        let store = Arc::new(Mutex::new(store));
        let runner = Arc::new(JobRunner {
            store: Arc::clone(&store),
            aggregator,
            settings,
        });

        Scheduler {
            store,
            runner,
            worker: Mutex::new(None),
        }
    }

    fn spawn_worker(&self) -> Worker {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.runner).run(shutdown.clone()));

        Worker { handle, shutdown }
    }

    /// Restarts the loop after a process restart if the store says it was running.
    pub async fn resume(&self) -> bool {
        if !self.store.lock().await.is_running() {
            return false;
        }

        let mut worker = self.worker.lock().await;
        if worker.is_none() {
            *worker = Some(self.spawn_worker());
            log::info!("Scheduler resumed from saved state.");
        }

        true
    }

    pub async fn start(&self) -> StartOutcome {
        let mut worker = self.worker.lock().await;

        if worker
            .as_ref()
            .is_some_and(|current| !current.handle.is_finished())
        {
            return StartOutcome::AlreadyRunning;
        }

        let jobs = {
            let mut store = self.store.lock().await;
            store.set_running(true);
            store.flush().await;
            store.get_all().len()
        };
        *worker = Some(self.spawn_worker());

        log::info!("Scheduler started with {} jobs.", jobs);

        StartOutcome::Started
    }

    /// Returns once the loop has exited. A job in flight is allowed to finish.
    pub async fn stop(&self) -> StopOutcome {
        let mut worker = self.worker.lock().await;

        let Some(current) = worker.take() else {
            let mut store = self.store.lock().await;
            if store.is_running() {
                store.set_running(false);
                store.flush().await;
            }
            return StopOutcome::AlreadyStopped;
        };

        current.shutdown.cancel();
        if let Err(e) = current.handle.await {
            log::error!("Scheduler loop ended abnormally. {}", e);
        }

        let mut store = self.store.lock().await;
        store.set_running(false);
        store.flush().await;
        log::info!("Scheduler stopped.");

        StopOutcome::Stopped
    }

    /// Stops the loop for process exit, keeping the saved `running` flag so
    /// the next process resumes.
    pub async fn shutdown(&self) {
        if let Some(current) = self.worker.lock().await.take() {
            current.shutdown.cancel();
            if let Err(e) = current.handle.await {
                log::error!("Scheduler loop ended abnormally. {}", e);
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.store.lock().await.is_running()
    }

    pub async fn add_job(&self, spec: JobSpec) -> String {
        let keywords = spec.keywords().len();
        let id = {
            let mut store = self.store.lock().await;
            let id = store.add(spec, Utc::now());
            store.flush().await;
            id
        };

        log::info!("Added job {} with {} keywords.", id, keywords);

        id
    }

    pub async fn remove_job(&self, id: &str) -> Result<(), ControlError> {
        self.mutate(id, |store| store.remove(id)).await?;

        log::info!("Removed job {}.", id);

        Ok(())
    }

    /// Makes the job due; the next poll picks it up.
    pub async fn run_job_now(&self, id: &str) -> Result<(), ControlError> {
        self.mutate(id, |store| store.mark_due(id, Utc::now())).await
    }

    pub async fn set_job_status(&self, id: &str, status: JobStatus) -> Result<(), ControlError> {
        self.mutate(id, |store| store.set_status(id, status)).await?;

        log::info!("Job {} is now {:?}.", id, status);

        Ok(())
    }

    pub async fn clear_jobs(&self) -> usize {
        let count = {
            let mut store = self.store.lock().await;
            let count = store.clear();
            store.flush().await;
            count
        };

        log::info!("Cleared {} scheduled jobs.", count);

        count
    }

    /// Applies a change to one job and persists it. `change` reports whether
    /// the job exists.
    async fn mutate<F>(&self, id: &str, change: F) -> Result<(), ControlError>
    where
        F: FnOnce(&mut JobStore) -> bool,
    {
        let mut store = self.store.lock().await;
        if !change(&mut *store) {
            return Err(ControlError::JobNotFound(id.to_string()));
        }
        store.flush().await;

        Ok(())
    }

    pub async fn job(&self, id: &str) -> Option<Job> {
        self.store.lock().await.get(id).cloned()
    }

    pub async fn snapshot(&self) -> SchedulerState {
        self.store.lock().await.state().clone()
    }
}
