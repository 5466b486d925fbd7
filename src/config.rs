use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;

use crate::error::ConfigError;

pub const DEFAULT_HH_BASE_URL: &str = "https://hh.ru";
pub const DEFAULT_SUPERJOB_API_URL: &str = "https://api.superjob.ru/2.0/vacancies";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub job_store_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub log_level: LevelFilter,
    pub poll_interval: Duration,
    pub failure_backoff_minutes: u32,
    pub hh_base_url: String,
    pub superjob_api_url: String,
    pub superjob_secret: Option<String>,
    pub source_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "vacancies.db".into(),
            job_store_path: PathBuf::from("scheduler_jobs.json"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7878)),
            log_level: LevelFilter::Info,
            poll_interval: Duration::from_secs(10),
            failure_backoff_minutes: 10,
            hh_base_url: DEFAULT_HH_BASE_URL.into(),
            superjob_api_url: DEFAULT_SUPERJOB_API_URL.into(),
            superjob_secret: None,
            source_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Builds the configuration from process environment variables.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let poll_secs: u64 = parse_or(get("SCHEDULER_POLL_SECS"), "SCHEDULER_POLL_SECS", 10)?;
        let failure_backoff_minutes: u32 = parse_or(
            get("SCHEDULER_BACKOFF_MINUTES"),
            "SCHEDULER_BACKOFF_MINUTES",
            defaults.failure_backoff_minutes,
        )?;
        let timeout_secs: u64 = parse_or(get("SOURCE_TIMEOUT_SECS"), "SOURCE_TIMEOUT_SECS", 10)?;

        require_positive("SCHEDULER_POLL_SECS", poll_secs)?;
        require_positive("SCHEDULER_BACKOFF_MINUTES", u64::from(failure_backoff_minutes))?;
        require_positive("SOURCE_TIMEOUT_SECS", timeout_secs)?;

        Ok(Config {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            job_store_path: get("JOB_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.job_store_path),
            bind_addr: parse_or(get("BIND_ADDR"), "BIND_ADDR", defaults.bind_addr)?,
            log_level: parse_or(get("LOG_LEVEL"), "LOG_LEVEL", defaults.log_level)?,
            poll_interval: Duration::from_secs(poll_secs),
            failure_backoff_minutes,
            hh_base_url: get("HH_BASE_URL").unwrap_or(defaults.hh_base_url),
            superjob_api_url: get("SUPERJOB_API_URL").unwrap_or(defaults.superjob_api_url),
            superjob_secret: get("SUPERJOB_SECRET"),
            source_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn require_positive(key: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be at least 1".into(),
        });
    }

    Ok(())
}
