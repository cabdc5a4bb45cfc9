//! Bounded retry with fixed intervals.

use std::future::Future;
use std::time::Duration;

/// A fixed schedule of waits between attempts.
///
/// The first attempt runs immediately; retry `n` waits `intervals[n]`.
/// Once the schedule is exhausted the failure is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    intervals: Vec<Duration>,
}

impl Default for RetryPolicy {
    /// Three retries after 100ms, 500ms and 1s.
    fn default() -> Self {
        Self::intervals([
            Duration::from_millis(100),
            Duration::from_millis(500),
            Duration::from_millis(1000),
        ])
    }
}

impl RetryPolicy {
    /// Creates a policy from an explicit schedule.
    pub fn intervals(intervals: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            intervals: intervals.into_iter().collect(),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::intervals([])
    }

    /// Same number of retries with every wait set to zero.
    pub fn immediate(&self) -> Self {
        Self::intervals(self.intervals.iter().map(|_| Duration::ZERO))
    }

    pub fn max_retries(&self) -> usize {
        self.intervals.len()
    }

    /// Wait before retry number `retry` (0-based), or None once exhausted.
    pub fn delay_for_retry(&self, retry: usize) -> Option<Duration> {
        self.intervals.get(retry).copied()
    }
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the policy is exhausted. Returns the last error.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    tracing::info!(retry, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }
                let Some(delay) = policy.delay_for_retry(retry) else {
                    tracing::warn!(retry, error = %err, "Operation failed after max retries");
                    return Err(err);
                };
                tracing::debug!(
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.delay_for_retry(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_retry(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_retry(3), None);
    }

    #[test]
    fn immediate_keeps_retry_count() {
        let policy = RetryPolicy::default().immediate();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.delay_for_retry(1), Some(Duration::ZERO));
        assert_eq!(RetryPolicy::none().max_retries(), 0);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<usize, String> = retry_with_predicate(
            &RetryPolicy::default().immediate(),
            move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("flaky".to_string()) } else { Ok(n) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_schedule() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), String> = retry_with_predicate(
            &RetryPolicy::intervals([Duration::ZERO, Duration::ZERO]),
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), String> = retry_with_predicate(
            &RetryPolicy::default(),
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("not found".to_string())
            },
            |_| false,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
