use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::warn;

use crate::config::ScraperConfig;
use crate::utils::error::{AppError, Result};

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
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

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(config.retry_attempts, Duration::from_millis(config.retry_delay_ms))
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        let delay_ms = self.delay.as_millis().min(u64::MAX as u128) as u64;
        FixedInterval::from_millis(delay_ms).take(self.attempts.saturating_sub(1) as usize)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error,
/// or the policy runs out of attempts. Every failed attempt is logged.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempt = AtomicU32::new(0);

    RetryIf::start(
        policy.strategy(),
        || {
            attempt.fetch_add(1, Ordering::Relaxed);
            operation()
        },
        |err: &AppError| {
            let current = attempt.load(Ordering::Relaxed);
            let retry = err.is_retryable() && current < policy.attempts;
            warn!(
                "{} failed (attempt {}/{}): {}{}",
                label,
                current,
                policy.attempts,
                err,
                if retry { ", retrying" } else { "" }
            );
            retry
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = retry_with_backoff(fast_policy(3), "fetch", || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(AppError::Browser("navigation failed".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_all_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = retry_with_backoff(fast_policy(3), "fetch", || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Fetch {
                    url: "https://example.com".to_string(),
                    message: "connection refused".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::Fetch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = retry_with_backoff(fast_policy(5), "fetch", || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::PageStructure {
                    selector: "body".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_never_drops_below_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_secs(10));
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.strategy().count(), 0);
        assert_eq!(RetryPolicy::new(3, Duration::from_secs(10)).strategy().count(), 2);
    }
}
