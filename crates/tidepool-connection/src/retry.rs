//! Bounded retry with a constant delay
//!
//! Acquisition under contention fails transiently (pool exhausted, acquire
//! timeout, server refusing new sessions). `retry` runs an operation up to
//! `max_attempts` times, sleeping `delay` between attempts, and wraps the
//! last failure in `TidepoolError::Acquisition`.

use std::future::Future;
use std::time::Duration;

use tidepool_core::{Result, TidepoolError};

/// How many times to attempt an acquisition and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is the total number of attempts, clamped to at least one
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// `operation` receives the 1-based attempt number. `on_retry` is called
/// with the attempt number and its error for every failure that will be
/// retried; the final failure is not reported through it.
pub async fn retry<T, F, Fut, R>(policy: &RetryPolicy, mut on_retry: R, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    R: FnMut(u32, &TidepoolError),
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "acquired after retrying");
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.max_attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "acquisition failed, retrying"
                );
                on_retry(attempt, &err);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(attempts = attempt, error = %err, "acquisition failed, giving up");
                return Err(TidepoolError::Acquisition {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    use super::*;

    fn refused() -> TidepoolError {
        TidepoolError::Connection("Too many connections".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures_and_waits_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        let calls = Cell::new(0);
        let retried = Cell::new(0);
        let started = Instant::now();

        let result = retry(
            &policy,
            |_, _| retried.set(retried.get() + 1),
            |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err(refused())
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
        assert_eq!(retried.get(), 2);
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_exact_attempt_count() {
        let policy = RetryPolicy::new(4, Duration::from_millis(10));
        let calls = Cell::new(0);

        let err = retry(
            &policy,
            |_, _| {},
            |_| {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(refused()) }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 4);
        match err {
            TidepoolError::Acquisition { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*source, TidepoolError::Connection(_)));
            }
            other => panic!("expected acquisition error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_does_not_sleep() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        let started = Instant::now();

        let value = retry(&policy, |_, _| {}, |_| async { Ok::<_, TidepoolError>(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_policy_clamps_to_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(5));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(RetryPolicy::default().delay(), Duration::from_millis(100));
    }
}
