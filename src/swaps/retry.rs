//! Shared retry/backoff policy for gateway operations
//!
//! One policy object replaces per-call-site retry loops. Transient failures
//! are retried with exponential backoff plus jitter; fatal failures abort
//! immediately; rate-limit failures wait out a longer delay (on top of the
//! channel limiter's cooldown).

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::errors::SwapError;
use crate::logger::{self, LogTag};

const RATE_LIMIT_EXTRA_DELAY_MS: u64 = 2000;
const JITTER_MAX_MS: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay_ms * 2u64.pow(attempt.saturating_sub(1));
        let jitter = rand::thread_rng().gen_range(0..JITTER_MAX_MS);
        Duration::from_millis(backoff + jitter)
    }
}

/// Run `operation` up to `policy.max_attempts` times. The closure receives
/// the 1-based attempt number so callers can re-quote or widen slippage per
/// attempt.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, SwapError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SwapError>>,
{
    let mut last_error = SwapError::Api(format!("{} not attempted", op_name));

    for attempt in 1..=policy.max_attempts {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_fatal() => {
                logger::warning(
                    LogTag::Swap,
                    &format!("{} attempt {} fatal, aborting retries: {}", op_name, attempt, e),
                );
                return Err(e);
            }
            Err(e) => {
                logger::warning(
                    LogTag::Swap,
                    &format!(
                        "{} attempt {}/{} failed: {}",
                        op_name, attempt, policy.max_attempts, e
                    ),
                );

                if attempt < policy.max_attempts {
                    let mut delay = policy.delay_for_attempt(attempt);
                    if e.is_rate_limit() {
                        delay += Duration::from_millis(RATE_LIMIT_EXTRA_DELAY_MS);
                    }
                    tokio::time::sleep(delay).await;
                }
                last_error = e;
            }
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_transient_errors_retried_to_success() {
        let policy = RetryPolicy::new(3, 1);
        let calls = AtomicU32::new(0);

        let result = with_retry(&policy, "test_op", |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(SwapError::SubmissionFailed("flaky".to_string()))
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
    async fn test_fatal_error_aborts_immediately() {
        let policy = RetryPolicy::new(5, 1);
        let calls = AtomicU32::new(0);

        let result: Result<(), SwapError> = with_retry(&policy, "test_op", |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SwapError::SimulationRejected("bad route".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(SwapError::SimulationRejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unverified_submission_never_resubmitted() {
        // A lost execute response may hide an existing receipt; the retry
        // loop must stop after the single ambiguous attempt
        let policy = RetryPolicy::new(3, 1);
        let calls = AtomicU32::new(0);

        let result: Result<(), SwapError> = with_retry(&policy, "submit_swap", |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SwapError::SubmissionUnverified("response lost".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(SwapError::SubmissionUnverified(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error() {
        let policy = RetryPolicy::new(2, 1);

        let result: Result<(), SwapError> = with_retry(&policy, "test_op", |attempt| async move {
            Err(SwapError::SubmissionFailed(format!("attempt {}", attempt)))
        })
        .await;

        match result {
            Err(SwapError::SubmissionFailed(msg)) => assert_eq!(msg, "attempt 2"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
