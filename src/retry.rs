//! Timeout and bounded retry for calls that leave the process

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How long one external call may take and how often it is retried.
///
/// Attempt `n` (1-based) that fails is followed by a pause of
/// `n * backoff` before the next attempt. A call that exceeds `timeout`
/// is abandoned and reported as [`Error::Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl CallPolicy {
    pub fn new(timeout: Duration, retries: u32, backoff: Duration) -> Self {
        Self {
            timeout,
            retries,
            backoff,
        }
    }

    /// Run `op`, retrying transient failures.
    pub async fn call<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.retries {
            match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !is_transient(&e) => return Err(e),
                Ok(Err(e)) => {
                    debug!(attempt = attempt + 1, error = %e, "{} failed", what);
                    last_err = Some(e);
                }
                Err(_) => {
                    debug!(attempt = attempt + 1, "{} timed out", what);
                    last_err = Some(Error::Timeout {
                        what: what.to_string(),
                        millis: self.timeout.as_millis() as u64,
                    });
                }
            }

            if attempt < self.retries {
                tokio::time::sleep(self.backoff * (attempt + 1)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Other(format!("{} failed", what))))
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 1, Duration::from_millis(200))
    }
}

/// Failures that another attempt cannot fix
fn is_transient(err: &Error) -> bool {
    !matches!(
        err,
        Error::Validation(_) | Error::NotFound(_) | Error::Config(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(retries: u32) -> CallPolicy {
        CallPolicy::new(Duration::from_millis(50), retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let value = fast_policy(1)
            .call("flaky", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::Embedding("503".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = fast_policy(1)
            .call("down", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Qdrant("connection refused".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Qdrant(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let result: Result<()> = fast_policy(0)
            .call("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(Error::Timeout { what, millis }) => {
                assert_eq!(what, "slow");
                assert_eq!(millis, 50);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validation_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = fast_policy(3)
            .call("bad input", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Validation("empty".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
