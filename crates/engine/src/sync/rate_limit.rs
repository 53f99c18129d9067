//! Bounded retry-on-429 for remote calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::shopify::ShopifyError;

/// Retries an operation while the remote reports rate limiting.
///
/// Any other failure is returned immediately. When every attempt is rate
/// limited, the last error is returned; earlier ones are discarded.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitedRequest {
    attempts: u32,
    backoff: Duration,
}

impl RateLimitedRequest {
    #[must_use]
    pub const fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            backoff,
        }
    }

    #[must_use]
    pub const fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.rate_limit_attempts, config.rate_limit_backoff)
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `operation` until it succeeds, fails with a non-rate-limit error,
    /// or the attempts are used up.
    ///
    /// # Errors
    ///
    /// Returns the first non-rate-limit error, or the last rate-limit error.
    pub async fn execute<T, F, Fut>(&self, nickname: &str, mut operation: F) -> Result<T, ShopifyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ShopifyError>>,
    {
        let mut attempts_left = self.attempts;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() => {
                    attempts_left -= 1;
                    warn!(
                        key = %format!("cmd:rate_limit_exceeded:{nickname}:attempts_left:{attempts_left}"),
                        nickname,
                        attempts_left,
                        "Rate limit exceeded"
                    );
                    if attempts_left == 0 {
                        return Err(e);
                    }
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    debug!(nickname, status = ?e.status(), "Remote call failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn status(code: u16) -> ShopifyError {
        ShopifyError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RateLimitedRequest::new(3, Duration::from_secs(2));

        let result = executor
            .execute("orders:count", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ShopifyError>(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limits_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RateLimitedRequest::new(3, Duration::from_secs(2));
        let started = tokio::time::Instant::now();

        let result = executor
            .execute("orders:page", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ShopifyError::RateLimited(2))
                    } else {
                        Ok("page")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "page");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_last_rate_limit_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RateLimitedRequest::new(3, Duration::from_secs(1));

        let err = executor
            .execute("orders:page", || {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ShopifyError::RateLimited(u64::from(n)))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, ShopifyError::RateLimited(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RateLimitedRequest::new(3, Duration::from_secs(1));

        let err = executor
            .execute("orders:page", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(status(500))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        assert_eq!(RateLimitedRequest::new(0, Duration::ZERO).attempts(), 1);
    }
}
