use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;

use vacancy_harvester::aggregator::SearchAggregator;
use vacancy_harvester::config::Config;
use vacancy_harvester::job_store::JobStore;
use vacancy_harvester::logger::init_logger;
use vacancy_harvester::scheduler::{Scheduler, SchedulerSettings};
use vacancy_harvester::server::{router, AppState};
use vacancy_harvester::sink::SqliteSink;
use vacancy_harvester::sources::configured_sources;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let config = Config::from_env()?;
    init_logger(config.log_level)?;

    let sink = Arc::new(SqliteSink::open(&config.database_url)?);
    let sources = configured_sources(&config)?;
    let aggregator = Arc::new(SearchAggregator::new(sources, sink.clone())?);

    let scheduler = Arc::new(Scheduler::new(
        JobStore::open(&config.job_store_path),
        aggregator.clone(),
        SchedulerSettings {
            poll_interval: config.poll_interval,
            failure_backoff: chrono::Duration::minutes(i64::from(config.failure_backoff_minutes)),
        },
    ));
    scheduler.resume().await;

    let app = router(AppState {
        scheduler: scheduler.clone(),
        aggregator,
        sink,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    log::info!("🚀 Server running on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal. {}", e);
        std::future::pending::<()>().await;
    }

    log::info!("Shutting down.");
}
