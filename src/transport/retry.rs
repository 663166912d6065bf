//! Fixed-schedule retry for transient storage failures

use super::repository::{StorageErrorKind, StorageResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry schedule for repository calls.
///
/// A failed call is retried once per entry in `delays_ms`, sleeping that long
/// first, but only if its kind is in `retryable`. Other failures return
/// immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Backoff before each retry, in milliseconds
    pub delays_ms: Vec<u64>,
    /// Failure kinds worth retrying
    pub retryable: Vec<StorageErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays_ms: vec![1000, 3000, 5000],
            retryable: vec![StorageErrorKind::Connection, StorageErrorKind::Unavailable],
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            delays_ms: Vec::new(),
            retryable: Vec::new(),
        }
    }

    /// Whether a failure of `kind` may be retried
    pub fn is_retryable(&self, kind: StorageErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Run `op`, retrying transient failures on the fixed schedule
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if self.is_retryable(err.kind) && attempt < self.delays_ms.len() => {
                    let delay = self.delays_ms[attempt];
                    attempt += 1;
                    tracing::warn!(
                        "{} failed ({}), retry {}/{} in {}ms",
                        operation,
                        err,
                        attempt,
                        self.delays_ms.len(),
                        delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
