//! Fixed-backoff retry policy for orchestrator requests.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use super::error::ApiError;

/// Retry policy with a fixed delay between attempts.
///
/// Retries every failure: transport errors and any non-2xx status, 4xx
/// included. The upstream contract predates status-aware retries and
/// compatibility with it is binding; callers that need 404 to be terminal
/// inspect the final error instead.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Execute an async operation, retrying until the attempt budget is
    /// spent. The last error is returned on exhaustion.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.attempts {
                        return Err(err);
                    }
                    warn!(
                        attempt,
                        max_attempts = self.attempts,
                        error = %err,
                        "request failed, retrying"
                    );
                    sleep(self.delay).await;
                }
            }
        }
    }
}
