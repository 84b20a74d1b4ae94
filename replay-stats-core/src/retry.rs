use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::ApiError;

/// The last error of a request that was given up on, and how many attempts were made.
#[derive(Debug, Clone, PartialEq)]
pub struct GaveUp {
    pub error: ApiError,
    pub attempts: u32,
}

/// Doubling schedule starting at `base_delay_ms` and levelling off at `max_delay_ms`.
/// Deterministic: no jitter and no overall time limit.
pub fn backoff_schedule(policy: &RetryPolicy) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(policy.base_delay_ms))
        .with_max_interval(Duration::from_millis(policy.max_delay_ms))
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(None)
        .build()
}

/// Next delay from `schedule`, raised to the server's `Retry-After` hint and never above
/// `max_delay_ms`.
pub fn next_delay(
    schedule: &mut ExponentialBackoff,
    policy: &RetryPolicy,
    hint: Option<Duration>,
) -> Duration {
    let cap = Duration::from_millis(policy.max_delay_ms);
    let backoff = schedule.next_backoff().unwrap_or(cap);
    let wanted = match hint {
        Some(h) => backoff.max(h),
        None => backoff,
    };
    wanted.min(cap)
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or `max_attempts` is
/// reached.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, GaveUp>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut schedule = backoff_schedule(policy);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(what, attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let hint = match &error {
                    ApiError::RateLimited { retry_after } => *retry_after,
                    _ => None,
                };
                let delay = next_delay(&mut schedule, policy, hint);
                warn!(
                    what,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Request failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(GaveUp {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}
