//! Bounded-retry helper for transient backend failures.

use std::future::Future;
use std::time::Duration;

/// Retry an async operation up to `max_attempts` times with exponential
/// backoff, starting at `base_delay` and doubling per attempt. Only
/// errors the `is_transient` predicate accepts are retried; the last
/// error is returned once attempts are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    is_transient: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = base_delay;

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_transient(&err) => {
                tracing::warn!(attempt, error = %err, "Transient backend failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("retry loop always returns")
}
