//! Bounded retry with backoff for remote writes.

use std::thread;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::StoreError;
use crate::store::StoreResult;

/// Backoff never sleeps longer than this, whatever the attempt count.
const MAX_BACKOFF_MS: u64 = 10_000;

/// Run `op` up to `retry.max_attempts` times. Only transient errors
/// (timeout, rate limit, unavailable, connection) are retried; anything
/// else fails the single operation immediately without aborting the batch.
/// Backoff grows linearly with attempt count, bounded.
pub fn execute<T>(
    label: &str,
    retry: &RetryConfig,
    mut op: impl FnMut() -> StoreResult<T>,
) -> StoreResult<T> {
    let mut last_err: Option<StoreError> = None;

    for attempt in 1..=retry.max_attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.is_transient() || attempt == retry.max_attempts {
                    return Err(e);
                }
                let wait = (retry.base_delay_ms * u64::from(attempt)).min(MAX_BACKOFF_MS);
                eprintln!(
                    "warning: {label}: retry {attempt}/{} in {wait}ms ({e})",
                    retry.max_attempts,
                );
                thread::sleep(Duration::from_millis(wait));
                last_err = Some(e);
            }
        }
    }

    // max_attempts >= 1 is enforced by config validation
    Err(last_err.unwrap_or_else(|| {
        StoreError::new(crate::error::StoreErrorKind::Other, format!("{label}: no attempts made"))
    }))
}

/// Short fixed pause between independent row operations, even on success.
/// Respects external rate limits proactively rather than reactively.
pub fn pause_between_rows(retry: &RetryConfig) {
    if retry.pause_between_rows_ms > 0 {
        thread::sleep(Duration::from_millis(retry.pause_between_rows_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorKind;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 0,
            pause_between_rows_ms: 0,
        }
    }

    #[test]
    fn first_attempt_success() {
        let mut calls = 0;
        let result = execute("op", &fast_retry(), || {
            calls += 1;
            Ok::<_, StoreError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn transient_failure_recovers() {
        let mut calls = 0;
        let result = execute("op", &fast_retry(), || {
            calls += 1;
            if calls < 2 {
                Err(StoreError::new(StoreErrorKind::RateLimited, "429"))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 2);
    }

    #[test]
    fn fatal_error_fails_immediately() {
        let mut calls = 0;
        let result: StoreResult<()> = execute("op", &fast_retry(), || {
            calls += 1;
            Err(StoreError::new(StoreErrorKind::Invalid, "bad payload"))
        });
        assert_eq!(result.unwrap_err().kind, StoreErrorKind::Invalid);
        assert_eq!(calls, 1);
    }

    #[test]
    fn transient_exhausts_after_max_attempts() {
        let mut calls = 0;
        let result: StoreResult<()> = execute("op", &fast_retry(), || {
            calls += 1;
            Err(StoreError::new(StoreErrorKind::Timeout, "slow"))
        });
        assert_eq!(result.unwrap_err().kind, StoreErrorKind::Timeout);
        assert_eq!(calls, 3);
    }
}
