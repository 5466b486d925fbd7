mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use vacancy_harvester::aggregator::{SearchAggregator, SourceReport, SourceStatus};
use vacancy_harvester::job_store::{JobSpec, JobStore};
use vacancy_harvester::scheduler::{Scheduler, SchedulerSettings, StartOutcome, StopOutcome};
use vacancy_harvester::sink::SqliteSink;
use vacancy_harvester::sources::Source;

use common::{eventually, DownSource, FixedSource};

fn settings() -> SchedulerSettings {
    SchedulerSettings {
        poll_interval: Duration::from_millis(25),
        failure_backoff: chrono::Duration::minutes(10),
    }
}

fn go_developer_job() -> JobSpec {
    JobSpec::new(vec!["go developer".into()], None, 10, 60, true).unwrap()
}

#[tokio::test]
async fn job_added_to_running_scheduler_runs_on_next_poll() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(SqliteSink::open(":memory:").unwrap());
    let hh = Arc::new(FixedSource::new("hh", 6));
    let sources: Vec<Arc<dyn Source>> = vec![hh.clone(), Arc::new(DownSource { tag: "superjob" })];
    let aggregator = Arc::new(SearchAggregator::new(sources, sink.clone()).unwrap());
    let scheduler = Scheduler::new(
        JobStore::open(dir.path().join("jobs.json")),
        aggregator.clone(),
        settings(),
    );

    assert_eq!(scheduler.start().await, StartOutcome::Started);
    let id = scheduler.add_job(go_developer_job()).await;

    let (handle, job_id) = (&scheduler, &id);
    eventually(move || async move {
        handle
            .job(job_id)
            .await
            .is_some_and(|job| job.run_count == 1)
    })
    .await;

    assert_eq!(scheduler.stop().await, StopOutcome::Stopped);

    let job = scheduler.job(&id).await.unwrap();
    let last_run = job.last_run.unwrap();
    assert_eq!(job.run_count, 1);
    assert_eq!(job.next_run, last_run + chrono::Duration::minutes(60));
    assert_eq!(hh.calls.load(Ordering::SeqCst), 1);

    let summary = job.last_result.unwrap();
    assert_eq!(summary.total, 6);
    assert_eq!(summary.inserted, 6);
    assert_eq!(summary.per_source["hh"], SourceReport::success(6));
    let superjob = &summary.per_source["superjob"];
    assert_eq!(superjob.count, 0);
    assert_eq!(superjob.status, SourceStatus::Error);
    assert!(superjob.error.as_deref().is_some_and(|e| e.contains("503")));

    assert_eq!(sink.count().unwrap(), 6);

    // Same search again: same report shape, nothing new to store.
    let report = aggregator.aggregate("go developer", None, 10).await;
    assert_eq!(report.total, 6);
    assert_eq!(report.inserted, 0);
    assert_eq!(report.per_source["hh"], SourceReport::success(6));
    assert_eq!(report.per_source["superjob"].status, SourceStatus::Error);
}

#[tokio::test]
async fn schedule_survives_a_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.json");
    let sources: Vec<Arc<dyn Source>> = vec![Arc::new(FixedSource::new("hh", 2))];
    let sink = Arc::new(SqliteSink::open(":memory:").unwrap());
    let aggregator = Arc::new(SearchAggregator::new(sources, sink).unwrap());

    let id = {
        let scheduler = Scheduler::new(JobStore::open(&path), aggregator.clone(), settings());
        scheduler.start().await;
        let spec = JobSpec::new(vec!["rust".into()], Some("Kazan".into()), 5, 30, false).unwrap();
        let id = scheduler.add_job(spec).await;
        scheduler.shutdown().await;
        id
    };

    let restarted = Scheduler::new(JobStore::open(&path), aggregator, settings());

    assert!(restarted.resume().await);
    let job = restarted.job(&id).await.unwrap();
    assert_eq!(job.city.as_deref(), Some("Kazan"));
    assert_eq!(job.interval_minutes, 30);
    assert_eq!(job.run_count, 0);

    assert_eq!(restarted.stop().await, StopOutcome::Stopped);
    assert!(!JobStore::load(&path).state.running);
}
