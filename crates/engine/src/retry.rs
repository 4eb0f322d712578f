use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(20, Duration::from_secs(1))
    }
}

#[derive(Debug, Error)]
#[error("{what} gave up after {attempts} attempts: {first_error}")]
pub struct RetryExhausted<E: std::fmt::Display> {
    pub what: &'static str,
    pub attempts: u32,
    /// The error of the first attempt; later ones are only logged at debug.
    pub first_error: E,
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached.
///
/// Only the first failure is logged at warn level. Each call to `op` must be
/// safe to repeat.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    what: &'static str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let first_error = match op().await {
        Ok(value) => return Ok(value),
        Err(e) => {
            warn!(what, attempt = 1, error = %e, "Attempt failed, retrying");
            e
        }
    };

    for attempt in 2..=policy.max_attempts {
        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => debug!(what, attempt, error = %e, "Retry failed"),
        }
    }

    Err(RetryExhausted {
        what,
        attempts: policy.max_attempts,
        first_error,
    })
}
