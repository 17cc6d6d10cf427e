//! Bounded retries with exponential backoff for external calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{RagError, Result};

/// The external capability a call goes to. Decides which error a timeout
/// is reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    DocumentStore,
    VectorIndex,
    Embedder,
}

impl Dependency {
    fn name(self) -> &'static str {
        match self {
            Self::DocumentStore => "document store",
            Self::VectorIndex => "vector index",
            Self::Embedder => "embedder",
        }
    }

    fn timed_out(self, operation: &str, after: Duration) -> RagError {
        let message = format!("{operation} timed out after {}ms", after.as_millis());
        match self {
            Self::Embedder => RagError::embedding(self.name(), message),
            Self::DocumentStore | Self::VectorIndex => RagError::store(self.name(), message),
        }
    }
}

/// Retry policy: `max_attempts` tries, each bounded by `timeout`, sleeping
/// `initial_backoff`, then twice that, and so on between tries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            timeout: config.timeout(),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `call` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. The last error is returned as-is.
    pub async fn run<T, F, Fut>(&self, dependency: Dependency, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(dependency.timed_out(operation, self.timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        dependency = dependency.name(),
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
