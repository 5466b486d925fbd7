use axum::http::StatusCode;
use thiserror::Error;

/// Failure of a single source call. Recovered by the aggregator.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("{0} is not configured")]
    NotConfigured(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("job store snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported job store version {0}")]
    Version(u32),

    #[error("job store write did not complete: {0}")]
    Interrupted(String),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("could not connect to database: {0}")]
    Connection(#[from] diesel::result::ConnectionError),

    #[error("database query failed: {0}")]
    Query(#[from] diesel::result::Error),
}

/// Rejections of control-surface input. Never reach scheduler state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("keywords cannot be empty.")]
    EmptyKeywords,

    #[error("interval_minutes must be greater than or equal to 1.")]
    IntervalTooShort,

    #[error("limit must be between 1 and {max}.")]
    InvalidLimit { max: usize },

    #[error("Job {0} does not exist.")]
    JobNotFound(String),
}

impl ControlError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControlError::JobNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ControlError> for (StatusCode, String) {
    fn from(error: ControlError) -> Self {
        (error.status_code(), error.to_string())
    }
}

/// A job execution that did not finish normally.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job execution panicked: {0}")]
    Panicked(String),

    #[error("job execution was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("more than one source is tagged {0:?}")]
    DuplicateSource(String),
}
