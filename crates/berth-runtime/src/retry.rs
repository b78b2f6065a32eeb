//! Bounded retry with exponential backoff
//!
//! Retries are applied only to errors classified as retryable by
//! [`RuntimeError::is_retryable`](crate::RuntimeError::is_retryable);
//! application-level failures surface immediately.

use crate::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub use berth_core::config::RetryPolicy;

/// Iterator over the delays a [`RetryPolicy`] allows.
///
/// A policy with `max_attempts` attempts yields `max_attempts - 1` delays,
/// one before each retry.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    next_delay: Duration,
    multiplier: f64,
    remaining: u32,
}

impl RetrySchedule {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            next_delay: policy.base_delay,
            multiplier: policy.multiplier,
            remaining: policy.max_attempts.saturating_sub(1),
        }
    }
}

impl Iterator for RetrySchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let delay = self.next_delay;
        self.next_delay = self.next_delay.mul_f64(self.multiplier);
        Some(delay)
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt budget is spent. The final error is returned unchanged.
pub async fn retry_with<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut schedule = RetrySchedule::new(policy);
    let mut attempt = 1u32;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => match schedule.next() {
                Some(delay) => {
                    warn!(
                        "{} failed on attempt {}: {}, retrying in {:?}",
                        operation, attempt, err, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_schedule_grows_by_multiplier() {
        let policy = RetryPolicy::new(4, Duration::from_millis(500), 2.0);
        let delays: Vec<Duration> = RetrySchedule::new(&policy).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ]
        );
    }

    #[test]
    fn test_schedule_constant_with_unit_multiplier() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), 1.0);
        let delays: Vec<Duration> = RetrySchedule::new(&policy).collect();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(2)]);
    }

    #[test]
    fn test_schedule_empty_for_single_attempt() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1), 2.0);
        assert_eq!(RetrySchedule::new(&policy).count(), 0);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1.0);
        let calls = AtomicU32::new(0);

        let result = retry_with(&policy, "probe", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RuntimeError::Connection("connection refused".to_string()))
                } else {
                    Ok("up")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "up");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_application_error() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1.0);
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with(&policy, "load", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RuntimeError::Model("model not found".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(RuntimeError::Model(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempt_budget() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1.0);
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with(&policy, "probe", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RuntimeError::Timeout("probe timed out".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(RuntimeError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
