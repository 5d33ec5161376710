//! Error types for orchestrator API operations.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the orchestrator REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Socket/DNS/connect/timeout or response-decode failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// 404 on a task-instance or xcom fetch, or on a DAG that does not
    /// exist. Callers recover from this locally; everything else is
    /// terminal for the tick.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Any other non-2xx status after retry exhaustion.
    #[error("status {status} from {url}: {body}")]
    Status {
        status: StatusCode,
        url: String,
        body: String,
    },
}

impl ApiError {
    /// Classify a non-2xx response.
    pub fn from_status(status: StatusCode, url: &str, body: String) -> Self {
        if status == StatusCode::NOT_FOUND {
            Self::NotFound {
                url: url.to_string(),
            }
        } else {
            Self::Status {
                status,
                url: url.to_string(),
                body,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
