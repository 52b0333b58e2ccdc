#![forbid(unsafe_code)]

// Bounded retry with a fixed inter-attempt delay. One policy type, applied
// uniformly to every flaky wait in the join sequence instead of ad hoc loops
// per call site.

use crate::driver::DriverError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Retry budget for a single wait-then-act step. The wrapped operation must
/// be safe to repeat; no distinction is made between timeout and other driver
/// errors, both consume an attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "crate::config::duration_ms")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Runs `op` until it succeeds or the budget is spent. A successful early
    /// attempt short-circuits; exhaustion yields the last error. A budget of
    /// zero is treated as one attempt.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, DriverError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(what, attempt, max = attempts, error = %e, "attempt failed");
                    last = Some(e);
                    if attempt < attempts {
                        sleep(self.delay).await;
                    }
                }
            }
        }
        // `last` is always set: the loop runs at least once and only exits
        // here after an Err.
        Err(last.unwrap_or_else(|| DriverError::Driver(format!("{what}: retry budget empty"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn flaky_probe(failures_before_success: u32) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<u32, DriverError>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let result = if n <= failures_before_success {
                Err(DriverError::timeout("probe", Duration::from_secs(1)))
            } else {
                Ok(n)
            };
            std::future::ready(result)
        };
        (calls, op)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_n_failures_consuming_n_plus_one_attempts() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let (calls, op) = flaky_probe(2);
        let result = policy.run("probe", op).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_try_success_short_circuits() {
        let policy = RetryPolicy::new(5, Duration::from_secs(10));
        let started = Instant::now();
        let (calls, op) = flaky_probe(0);
        policy.run("probe", op).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_consumes_exactly_max_attempts() {
        let policy = RetryPolicy::new(4, Duration::from_millis(250));
        let started = Instant::now();
        let (calls, op) = flaky_probe(u32::MAX);
        let err = policy.run("probe", op).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Delay is applied between attempts only: (4 - 1) * 250ms.
        assert_eq!(started.elapsed(), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_still_attempts_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(100));
        let (calls, op) = flaky_probe(u32::MAX);
        policy.run("probe", op).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_timeout_driver_errors_are_retried_too() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = policy
            .run("probe", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<(), _>(DriverError::Driver("detached frame".into())))
            })
            .await
            .unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
