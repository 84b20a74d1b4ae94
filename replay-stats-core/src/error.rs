//! Error types for the collector and the service client.
//!
//! [`ApiError`] is what a [`crate::contract::ReplayApi`] implementation returns for a single
//! request. [`CollectError`] is what a whole run fails with; the pipeline maps the API errors
//! it cannot recover from into it.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single request against the replay service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 401/403: the token is missing, invalid or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 404 for the requested resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// 429. `retry_after` carries the server's `Retry-After` hint when present.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, timeout or TLS failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::RateLimited { .. } | ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// All errors produced by a collector run.
#[derive(Error, Debug)]
pub enum CollectError {
    /// The token does not authorize access to the group.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The group does not exist or is not visible to the token.
    #[error("group not found: {0}")]
    NotFound(String),

    /// The service kept throttling after every allowed attempt.
    #[error("rate limited by the replay service after {attempts} attempt(s)")]
    RateLimit { attempts: u32 },

    /// Some replay detail requests failed after exhausting allowed attempts.
    #[error("failed to fetch {} replay(s): {}", failed.len(), failed.join(", "))]
    PartialFetch { failed: Vec<String> },

    /// Any other API failure while listing the group.
    #[error("replay service request failed: {0}")]
    Api(ApiError),

    /// A replay id that cannot be used as a file name.
    #[error("replay id {0:?} is not a safe file name")]
    InvalidReplayId(String),

    /// Writing an output artifact failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write summary table: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to encode replay document: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CollectError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CollectError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Maps a request error that ended a run into the run-level taxonomy.
    pub fn from_api(err: ApiError, attempts: u32) -> Self {
        match err {
            ApiError::Unauthorized(msg) => CollectError::Auth(msg),
            ApiError::NotFound(what) => CollectError::NotFound(what),
            ApiError::RateLimited { .. } => CollectError::RateLimit { attempts },
            other => CollectError::Api(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectError>;
