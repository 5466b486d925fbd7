//! Durable record of scheduled searches and of the scheduler's run flag.
//!
//! The whole state is one JSON snapshot rewritten after every mutation.
//! Mutating methods only change memory; the owner then calls
//! [`JobStore::flush`] (or [`JobStore::persist`] outside async code). Writes go
//! to `<path>.tmp` first and are renamed over the snapshot. The previous
//! snapshot is kept as `<path>.backup` when it is valid, so a crash never
//! leaves a file that [`JobStore::load`] cannot read and the backup is always
//! the last good one.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::{RunReport, SourceReport, SourceStatus};
use crate::error::{ControlError, StoreError};

const SNAPSHOT_VERSION: u32 = 1;
pub const MAX_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Disabled,
}

/// Merged per-source outcome of one job execution across all its keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub inserted: usize,
    pub per_source: BTreeMap<String, SourceReport>,
}

impl RunSummary {
    /// Folds one keyword's report in. Counts add up; a source that failed
    /// for any keyword is reported as failed with its first error.
    pub fn absorb(&mut self, report: &RunReport) {
        self.total += report.total;
        self.inserted += report.inserted;

        for (tag, source) in &report.per_source {
            let entry = self
                .per_source
                .entry(tag.clone())
                .or_insert_with(|| SourceReport::success(0));
            entry.count += source.count;
            if source.status == SourceStatus::Error && entry.status == SourceStatus::Success {
                entry.status = SourceStatus::Error;
                entry.error = source.error.clone();
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub keywords: Vec<String>,
    pub city: Option<String>,
    pub limit: usize,
    pub interval_minutes: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    #[serde(default)]
    pub total_found: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_result: Option<RunSummary>,
}

impl Job {
    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.interval_minutes))
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Active && self.next_run <= now
    }

    /// A `next_run` that moved during the run was set by "run now" and wins.
    fn reschedule(&mut self, scheduled_for: DateTime<Utc>, next_run: DateTime<Utc>) {
        if self.next_run == scheduled_for {
            self.next_run = next_run;
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err("no keywords".into());
        }
        if self.interval_minutes < 1 {
            return Err("interval below one minute".into());
        }
        if self.limit < 1 {
            return Err("limit below one".into());
        }
        Ok(())
    }
}

/// A validated request for a new job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    keywords: Vec<String>,
    city: Option<String>,
    limit: usize,
    interval_minutes: u32,
    run_immediately: bool,
}

impl JobSpec {
    pub fn new(
        keywords: Vec<String>,
        city: Option<String>,
        limit: usize,
        interval_minutes: u32,
        run_immediately: bool,
    ) -> Result<Self, ControlError> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect();

        if keywords.is_empty() {
            return Err(ControlError::EmptyKeywords);
        }

        if interval_minutes < 1 {
            return Err(ControlError::IntervalTooShort);
        }

        if limit < 1 || limit > MAX_LIMIT {
            return Err(ControlError::InvalidLimit { max: MAX_LIMIT });
        }

        let city = city.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

        Ok(JobSpec {
            keywords,
            city,
            limit,
            interval_minutes,
            run_immediately,
        })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub version: u32,
    pub running: bool,
    pub jobs: BTreeMap<String, Job>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        SchedulerState {
            version: SNAPSHOT_VERSION,
            running: false,
            jobs: BTreeMap::new(),
            last_update: None,
        }
    }
}

/// On-disk shape. Jobs stay raw so one bad record can be dropped alone.
#[derive(Deserialize)]
struct RawSnapshot {
    version: u32,
    running: bool,
    jobs: BTreeMap<String, serde_json::Value>,
    last_update: Option<DateTime<Utc>>,
}

pub struct Loaded {
    pub state: SchedulerState,
    /// The file was missing, corrupt or partly invalid and should be rewritten.
    pub needs_persist: bool,
}

pub struct JobStore {
    path: PathBuf,
    state: SchedulerState,
}

impl JobStore {
    /// Loads the snapshot at `path` and rewrites a clean baseline if needed.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = Self::load(&path);
        let mut store = JobStore {
            path,
            state: loaded.state,
        };

        if loaded.needs_persist {
            if let Err(e) = store.persist() {
                log::error!("Failed to persist job store {}. {}", store.path.display(), e);
            }
        }

        log::info!(
            "Job store {} loaded: {} jobs, running={}",
            store.path.display(),
            store.state.jobs.len(),
            store.state.running
        );

        store
    }

    /// Never fails: unreadable snapshots fall back to the backup, then to an
    /// empty stopped state.
    pub fn load(path: &Path) -> Loaded {
        if !path.exists() {
            return Loaded {
                state: SchedulerState::default(),
                needs_persist: true,
            };
        }

        match read_snapshot(path) {
            Ok((state, dropped)) => {
                for (id, reason) in &dropped {
                    log::warn!("Dropping stored job {}: {}", id, reason);
                }
                return Loaded {
                    state,
                    needs_persist: !dropped.is_empty(),
                };
            }
            Err(e) => log::warn!("Job store {} is unreadable. {}", path.display(), e),
        }

        let backup = backup_path(path);
        if backup.exists() {
            match read_snapshot(&backup) {
                Ok((state, _)) => {
                    log::warn!("Recovered job store from {}", backup.display());
                    return Loaded {
                        state,
                        needs_persist: true,
                    };
                }
                Err(e) => log::warn!("Job store backup {} is unreadable. {}", backup.display(), e),
            }
        }

        log::warn!("Starting with an empty job store.");

        Loaded {
            state: SchedulerState::default(),
            needs_persist: true,
        }
    }

    /// Writes the snapshot on the calling thread.
    pub fn persist(&mut self) -> Result<(), StoreError> {
        let json = self.encode()?;
        write_snapshot(&self.path, &json)
    }

    /// Writes the snapshot on the blocking pool, logging instead of failing:
    /// memory stays authoritative. Callers hold the store lock across this,
    /// which keeps snapshots in mutation order.
    pub async fn flush(&mut self) {
        let written = match self.encode() {
            Ok(json) => {
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || write_snapshot(&path, &json))
                    .await
                    .unwrap_or_else(|e| Err(StoreError::Interrupted(e.to_string())))
            }
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            log::error!("Failed to persist job store {}. {}", self.path.display(), e);
        }
    }

    fn encode(&mut self) -> Result<Vec<u8>, StoreError> {
        self.state.last_update = Some(Utc::now());
        Ok(serde_json::to_vec_pretty(&self.state)?)
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.state.running = running;
    }

    pub fn add(&mut self, spec: JobSpec, now: DateTime<Utc>) -> String {
        let mut id = Uuid::new_v4().to_string();
        while self.state.jobs.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        let interval = Duration::minutes(i64::from(spec.interval_minutes));
        let next_run = if spec.run_immediately {
            now
        } else {
            now + interval
        };

        let job = Job {
            id: id.clone(),
            keywords: spec.keywords,
            city: spec.city,
            limit: spec.limit,
            interval_minutes: spec.interval_minutes,
            status: JobStatus::Active,
            created_at: now,
            next_run,
            last_run: None,
            run_count: 0,
            total_found: 0,
            last_error: None,
            last_result: None,
        };

        self.state.jobs.insert(id.clone(), job);

        id
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.state.jobs.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.state.jobs.get(id)
    }

    pub fn get_all(&self) -> &BTreeMap<String, Job> {
        &self.state.jobs
    }

    pub fn clear(&mut self) -> usize {
        let count = self.state.jobs.len();
        self.state.jobs.clear();
        count
    }

    /// Snapshot of every active job whose `next_run` is at or before `now`.
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<Job> {
        self.state
            .jobs
            .values()
            .filter(|job| job.is_due(now))
            .cloned()
            .collect()
    }

    pub fn mark_due(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        let Some(job) = self.state.jobs.get_mut(id) else {
            return false;
        };
        job.next_run = now;
        true
    }

    pub fn set_status(&mut self, id: &str, status: JobStatus) -> bool {
        let Some(job) = self.state.jobs.get_mut(id) else {
            return false;
        };
        job.status = status;
        true
    }

    /// Records a finished run that was selected while `next_run` was
    /// `scheduled_for`. Returns `false` when the job was removed while it was
    /// running.
    pub fn record_success(
        &mut self,
        id: &str,
        scheduled_for: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        summary: RunSummary,
    ) -> bool {
        let Some(job) = self.state.jobs.get_mut(id) else {
            return false;
        };
        job.last_run = Some(finished_at);
        job.run_count += 1;
        job.reschedule(scheduled_for, finished_at + job.interval());
        job.total_found += summary.total as u64;
        job.last_error = None;
        job.last_result = Some(summary);
        true
    }

    /// Same contract as [`JobStore::record_success`].
    pub fn record_failure(
        &mut self,
        id: &str,
        scheduled_for: DateTime<Utc>,
        retry_at: DateTime<Utc>,
        error: String,
    ) -> bool {
        let Some(job) = self.state.jobs.get_mut(id) else {
            return false;
        };
        job.reschedule(scheduled_for, retry_at);
        job.last_error = Some(error);
        true
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    with_suffix(path, "tmp")
}

fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, "backup")
}

fn write_snapshot(path: &Path, json: &[u8]) -> Result<(), StoreError> {
    let tmp = tmp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json)?;
        file.sync_all()?;
    }

    // Only a fully valid snapshot may replace the backup.
    let current_is_good = path.exists()
        && read_snapshot(path).is_ok_and(|(_, dropped)| dropped.is_empty());
    if current_is_good {
        fs::copy(path, backup_path(path))?;
    }
    fs::rename(&tmp, path)?;

    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Returns the state and the job records that had to be dropped, with why.
fn read_snapshot(path: &Path) -> Result<(SchedulerState, Vec<(String, String)>), StoreError> {
    let bytes = fs::read(path)?;
    let raw: RawSnapshot = serde_json::from_slice(&bytes)?;

    if raw.version != SNAPSHOT_VERSION {
        return Err(StoreError::Version(raw.version));
    }

    let mut jobs = BTreeMap::new();
    let mut dropped = Vec::new();

    for (id, value) in raw.jobs {
        let job = serde_json::from_value::<Job>(value)
            .map_err(|e| e.to_string())
            .and_then(|job| {
                if job.id != id {
                    return Err(format!("id mismatch with key {}", id));
                }
                job.validate().map(|()| job)
            });

        match job {
            Ok(job) => {
                jobs.insert(id, job);
            }
            Err(reason) => dropped.push((id, reason)),
        }
    }

    Ok((
        SchedulerState {
            version: SNAPSHOT_VERSION,
            running: raw.running,
            jobs,
            last_update: raw.last_update,
        },
        dropped,
    ))
}
