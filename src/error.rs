//! Error taxonomy for the collection pipeline.
//!
//! Only `SchedulerError::Runtime` is fatal (raised at boot). Everything
//! else degrades into a partial result for the caller.

use thiserror::Error;

/// Transport-level failure of a single request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Failure of a whole adapter run, caught at the orchestrator boundary.
///
/// The built-in adapters swallow per-request failures, so this comes
/// from adapters that can tell "the source is down" apart from "nothing
/// new".
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unreachable: {0}")]
    Unreachable(String),
}

/// Storage failure. A failed commit rolls back the whole batch.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A key in the batch already exists (or changed while committing).
    #[error("constraint violation on {0}")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<redis::RedisError> for PersistenceError {
    fn from(e: redis::RedisError) -> Self {
        PersistenceError::Unavailable(e.to_string())
    }
}

/// Bad caller input. Never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("hour must be between 0 and 23, got {0}")]
    HourOutOfRange(i64),

    #[error("minute must be between 0 and 59, got {0}")]
    MinuteOutOfRange(i64),

    #[error("job id is required")]
    MissingJobId,

    #[error("days_back must not be negative, got {0}")]
    NegativeDaysBack(i64),

    #[error("search term is required")]
    EmptySearchTerm,

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("job '{0}' does not support manual execution")]
    NotSupported(String),

    #[error("job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("job '{id}' failed: {reason}")]
    JobFailed { id: String, reason: String },

    #[error("scheduler timer could not start: {0}")]
    Runtime(String),
}

/// Failure of a caller-facing operation.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The request is well-formed but refused.
    #[error("{0}")]
    Rejected(String),
}
