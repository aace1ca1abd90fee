//! Bounded retry with a per-attempt deadline for storage calls.

use std::future::Future;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::store::StoreError;

/// How storage calls are bounded and retried.
///
/// Every attempt runs under `timeout`; an attempt that overruns becomes
/// [`StoreError::Timeout`]. Transient failures are retried up to
/// `max_retries` more times with linear backoff. Anything else is
/// returned on the first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Extra attempts after the first transient failure.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2_000),
            max_retries: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Builds the policy from the `STORAGE_*` settings.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.storage_timeout_ms),
            max_retries: config.storage_max_retries,
            backoff: Duration::from_millis(config.storage_retry_backoff_ms),
        }
    }

    /// Runs `call` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the last [`StoreError`] observed.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::time::timeout(self.timeout, call())
                .await
                .unwrap_or(Err(StoreError::Timeout));
            match outcome {
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt = attempt.saturating_add(1);
                    tracing::warn!(op, attempt, error = %err, "retrying storage call");
                    tokio::time::sleep(self.backoff.saturating_mul(attempt)).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = fast_policy(3)
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StoreError::Contention("serialization failure".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), StoreError> = fast_policy(2)
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::Timeout)
                }
            })
            .await;
        assert_eq!(result, Err(StoreError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), StoreError> = fast_policy(5)
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::CodeCollision)
                }
            })
            .await;
        assert_eq!(result, Err(StoreError::CodeCollision));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result: Result<(), StoreError> = fast_policy(0)
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(StoreError::Timeout));
    }
}
