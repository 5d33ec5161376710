//! Domain errors for the watcher engine.

use thiserror::Error;

use crate::infrastructure::airflow::ApiError;

/// Errors a watch tick can end with.
///
/// Every variant is contained by the watcher run loop: the tick is logged
/// as `error` and the loop sleeps and retries. Nothing here terminates the
/// process.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The observable orchestrator state contradicts an assumption the
    /// set algebra relies on, e.g. a single upstream scene matched by
    /// more than one row of the same sensor.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A scene coordinate could not be coerced to its declared dtype.
    #[error("cannot coerce {value} to {dtype}")]
    Coercion { value: String, dtype: &'static str },

    /// Orchestrator API failure that survived the retry policy.
    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type DomainResult<T> = Result<T, WatchError>;
