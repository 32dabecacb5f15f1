//! Bounded retry with exponential backoff
//!
//! All remote calls (IPFS gateway, pinning service, AI node) go through
//! [`with_retry`] so retry behavior lives in one place and every attempt is
//! logged the same way. Callers classify failures via
//! [`backoff::Error::transient`] / [`backoff::Error::permanent`].

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use tracing::warn;

/// Bounded policy for one class of remote operation
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling for the growing delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// IPFS gateway fetches: 3 attempts
    pub fn ipfs_fetch() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }

    /// Pinning service uploads: 2 attempts
    pub fn ipfs_pin() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(750),
            max_delay: Duration::from_secs(5),
        }
    }

    /// AI node calls: one retry on transport errors or 5xx
    pub fn ai_call() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or exhausts the policy.
///
/// Transient failures past the attempt budget are surfaced as-is. Each retry
/// is logged with the operation description, attempt number and delay.
pub async fn with_retry<T, E, Op, Fut>(desc: &str, policy: RetryPolicy, mut op: Op) -> Result<T, E>
where
    E: std::fmt::Display,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, backoff::Error<E>>>,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_delay)
        .with_max_interval(policy.max_delay)
        .with_max_elapsed_time(None)
        .build();

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(backoff::Error::Permanent(err)) => return Err(err),
            Err(backoff::Error::Transient { err, retry_after }) => {
                if attempt >= policy.max_attempts {
                    warn!(
                        operation = desc,
                        attempts = attempt,
                        error = %err,
                        "retries exhausted"
                    );
                    return Err(err);
                }
                let delay = retry_after
                    .or_else(|| backoff.next_backoff())
                    .unwrap_or(policy.max_delay);
                warn!(
                    operation = desc,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_retry("op", fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_retried_until_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry("op", fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(backoff::Error::transient("boom".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry("op", fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(backoff::Error::permanent("nope".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry("op", fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(backoff::Error::transient("flaky".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
