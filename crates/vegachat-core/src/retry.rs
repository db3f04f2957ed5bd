//! Fixed-count, fixed-delay retry

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first one.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_DELAY)
    }
}

/// Run `op` until it succeeds or `policy.attempts` invocations have failed.
///
/// Every failure is treated the same way: wait `policy.delay`, then try
/// again. The error of the last attempt is returned.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(attempt, attempts, error = %e, "attempt failed, retrying");
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
    op().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_op(
        calls: Arc<AtomicU32>,
        succeed_on: u32,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, String>> + Send>> {
        move || {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= succeed_on {
                    Ok(n)
                } else {
                    Err(format!("failure {}", n))
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry(RetryPolicy::default(), counting_op(Arc::clone(&calls), 1)).await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_a_later_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();
        let result = retry(
            RetryPolicy::new(3, Duration::from_millis(1000)),
            counting_op(Arc::clone(&calls), 2),
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000) && elapsed < Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_returns_last_error() {
        for attempts in 1..=5 {
            let calls = Arc::new(AtomicU32::new(0));
            let result = retry(
                RetryPolicy::new(attempts, Duration::from_millis(10)),
                counting_op(Arc::clone(&calls), u32::MAX),
            )
            .await;
            assert_eq!(result, Err(format!("failure {}", attempts)));
            assert_eq!(calls.load(Ordering::SeqCst), attempts);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_never_sleeps() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();
        let result = retry(
            RetryPolicy::new(1, Duration::from_secs(60)),
            counting_op(Arc::clone(&calls), u32::MAX),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }
}
