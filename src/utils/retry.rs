//! Retry-with-backoff helpers, shared by the bulk writer's insert path and
//! the ETL scheduler's deadlock-retry path.

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Retry a synchronous, fallible operation up to `max_attempts` times with
/// exponential backoff (`base_delay_ms * 2^(attempt - 1)`). Returns the
/// number of attempts taken on success, or the last error paired with the
/// attempt count on exhaustion.
pub fn retry_with_backoff<F, T, E>(
    max_attempts: u32,
    base_delay_ms: u64,
    mut operation: F,
) -> Result<(T, u32), (E, u32)>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match operation() {
            Ok(value) => return Ok((value, attempts)),
            Err(err) if attempts >= max_attempts => return Err((err, attempts)),
            Err(err) => {
                let delay = Duration::from_millis(base_delay_ms * 2_u64.pow(attempts - 1));
                tracing::warn!(attempt = attempts, max_attempts, error = %err, delay_ms = delay.as_millis() as u64, "retrying after failure");
                std::thread::sleep(delay);
            }
        }
    }
}

/// Async counterpart of [`retry_with_backoff`]. `jitter_fraction` adds up to
/// `±jitter_fraction` of the computed delay (used by the ETL deadlock retry
/// to avoid synchronized retries across scheduler ticks).
pub async fn retry_with_backoff_async<F, Fut, T, E>(
    max_attempts: u32,
    base_delay_ms: u64,
    jitter_fraction: f64,
    mut operation: F,
) -> Result<(T, u32), (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok((value, attempts)),
            Err(err) if attempts >= max_attempts => return Err((err, attempts)),
            Err(err) => {
                let base = base_delay_ms * 2_u64.pow(attempts - 1);
                let delay = apply_jitter(base, jitter_fraction);
                tracing::warn!(attempt = attempts, max_attempts, error = %err, delay_ms = delay.as_millis() as u64, "retrying after failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Exponential backoff delay for `attempt` (1-based) with `±jitter_fraction`
/// applied, exposed for callers that need custom retry-predicate logic
/// `retry_with_backoff_async` doesn't support (e.g. "only retry this one
/// error variant").
pub fn backoff_delay(attempt: u32, base_delay_ms: u64, jitter_fraction: f64) -> Duration {
    let base = base_delay_ms * 2_u64.pow(attempt.saturating_sub(1));
    apply_jitter(base, jitter_fraction)
}

fn apply_jitter(base_ms: u64, jitter_fraction: f64) -> Duration {
    if jitter_fraction <= 0.0 {
        return Duration::from_millis(base_ms);
    }
    let jitter_span = (base_ms as f64 * jitter_fraction).max(0.0);
    let offset = rand::random::<f64>() * 2.0 * jitter_span - jitter_span;
    let jittered = (base_ms as f64 + offset).max(0.0);
    Duration::from_millis(jittered as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn succeeds_immediately_without_retry() {
        let result: Result<(u32, u32), (String, u32)> =
            retry_with_backoff(3, 1, || Ok::<u32, String>(42));
        assert_eq!(result.unwrap(), (42, 1));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let attempts = Cell::new(0);
        let result = retry_with_backoff(3, 1, || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err::<u32, String>("not yet".to_string())
            } else {
                Ok(99)
            }
        });
        assert_eq!(result.unwrap(), (99, 3));
    }

    #[test]
    fn exhausts_attempts_and_returns_last_error() {
        let result: Result<(u32, u32), (String, u32)> =
            retry_with_backoff(3, 1, || Err("always fails".to_string()));
        let (err, attempts) = result.unwrap_err();
        assert_eq!(attempts, 3);
        assert_eq!(err, "always fails");
    }

    #[tokio::test]
    async fn async_retry_succeeds_after_failures() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = retry_with_backoff_async(3, 1, 0.0, || async {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if n < 2 {
                Err::<u32, String>("deadlock".to_string())
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), (7, 2));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..50 {
            let delay = apply_jitter(1000, 0.25);
            assert!(delay.as_millis() >= 750 && delay.as_millis() <= 1250);
        }
    }
}
