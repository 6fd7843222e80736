//! Retryable-operation wrapper.
//!
//! [`retry`] re-runs an async operation while a predicate classifies its
//! error as retryable, sleeping a linearly growing delay between
//! attempts. Non-retryable errors and the error of the final attempt are
//! returned unchanged.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (0-based): `base × (retry + 1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * (retry + 1)
    }
}

pub async fn retry<T, E, Op, Fut, P>(policy: &RetryPolicy, is_retryable: P, mut op: Op) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if retries < policy.max_retries && is_retryable(&err) => {
                let delay = policy.delay_for(retries);
                tracing::warn!(
                    retry = retries + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum Failure {
        Busy,
        Fatal,
    }

    impl Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn quick(max_retries: u32) -> RetryPolicy {
        RetryPolicy::linear(max_retries, Duration::from_millis(1))
    }

    #[test]
    fn linear_schedule() {
        let p = RetryPolicy::linear(3, Duration::from_secs(5));
        assert_eq!(p.delay_for(0), Duration::from_secs(5));
        assert_eq!(p.delay_for(1), Duration::from_secs(10));
        assert_eq!(p.delay_for(2), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry(&quick(3), |e| *e == Failure::Busy, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Failure::Busy)
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Failure> = retry(&quick(2), |e| *e == Failure::Busy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Failure::Busy)
        })
        .await;
        assert_eq!(result, Err(Failure::Busy));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Failure> = retry(&quick(5), |e| *e == Failure::Busy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Failure::Fatal)
        })
        .await;
        assert_eq!(result, Err(Failure::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
