//! Exponential backoff for `TransientBackendError` (§5, §7: "up to
//! `RETRY_MAX` attempts with exponential backoff, only for
//! `TransientBackendError`").

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::GraphStoreError;

/// Retries `op` up to `max_attempts` times (the first call plus
/// `max_attempts - 1` retries) with exponential backoff, but only while
/// the error is `GraphStoreError::is_retryable()`. Any other error, or
/// exhausting the attempt budget, returns the last error immediately.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, GraphStoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GraphStoreError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let backoff = Duration::from_millis(50 * 2u64.pow(attempt - 1));
                warn!(attempt, ?backoff, "retrying transient graph store error: {err}");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_up_to_the_bound() {
        let calls = AtomicU32::new(0);
        let result: Result<(), GraphStoreError> = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GraphStoreError::Transient("flaky".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), GraphStoreError> = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GraphStoreError::NotFound("x".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_a_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(GraphStoreError::Transient("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
