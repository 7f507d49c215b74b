use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::SyncApiError;

/// Retry behavior for remote calls: exponential backoff with jitter, honoring
/// server-requested delays for rate limits.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts (not counting the initial attempt).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
    /// Cap on the backoff growth.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Backoff for a given attempt: min(base * 2^attempt, max), plus up to
    /// 25% jitter so parallel clients do not stampede.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=delay_ms / 4);
        Duration::from_millis(delay_ms + jitter)
    }

    /// Run `f`, retrying transient errors with backoff. Non-transient errors
    /// return immediately.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T, SyncApiError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, SyncApiError>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_attempts {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("{}: Succeeded after {} retries", operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !err.is_transient() {
                        warn!(
                            "{}: Non-transient error, not retrying: {}",
                            operation_name, err
                        );
                        return Err(err);
                    }

                    debug!("{}: Transient error: {}", operation_name, err);
                    last_error = Some(err.clone());

                    if attempt < self.max_attempts {
                        let delay = match err.retry_after() {
                            Some(seconds) => {
                                debug!(
                                    "{}: Server asked to wait {}s before retry",
                                    operation_name, seconds
                                );
                                Duration::from_secs(seconds)
                                    .min(Duration::from_millis(self.max_delay_ms))
                            }
                            None => self.calculate_delay(attempt),
                        };
                        debug!(
                            "{}: Waiting {:?} before retry {} of {}",
                            operation_name,
                            delay,
                            attempt + 1,
                            self.max_attempts
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| SyncApiError::Other(format!("{operation_name}: no error captured")));
        warn!(
            "{}: All {} attempts failed, last error: {}",
            operation_name,
            self.max_attempts + 1,
            err
        );
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy::new(5, 1_000, 4_000);
        // Jitter adds at most 25%.
        assert!(policy.calculate_delay(0) >= Duration::from_millis(1_000));
        assert!(policy.calculate_delay(0) <= Duration::from_millis(1_250));
        assert!(policy.calculate_delay(10) <= Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let policy = RetryPolicy::new(3, 1, 2);
        let attempts = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute("op", || {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SyncApiError::Network("refused".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let policy = RetryPolicy::default();
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute("op", || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(SyncApiError::Authentication {
                        status: 401,
                        message: "unauthorized".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_then_surfaces() {
        let policy = RetryPolicy::new(2, 1, 2);
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute("op", || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(SyncApiError::Network("refused".into()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
