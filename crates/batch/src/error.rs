//! Batch and fetch error types.

use geo_common::GeoError;
use thiserror::Error;

pub type BatchResult<T> = Result<T, BatchError>;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("max_workers must be at least 1")]
    NoWorkers,

    #[error("Failed to build worker pool: {0}")]
    Pool(String),

    #[error("Task {index} failed: {message}")]
    TaskFailed { index: usize, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<BatchError> for GeoError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::NoWorkers => GeoError::invalid("max_workers", err.to_string()),
            BatchError::Http(e) if e.is_timeout() => GeoError::Timeout,
            BatchError::Http(_) | BatchError::Status { .. } => {
                GeoError::FetchError(err.to_string())
            }
            BatchError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                GeoError::SourceNotFound(e.to_string())
            }
            other => GeoError::InternalError(other.to_string()),
        }
    }
}
