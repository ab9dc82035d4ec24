//! Retry utilities with exponential backoff.
//!
//! Backend calls (embedding, generation, vision) are network-bound and may
//! fail transiently. Failures are retried a bounded number of times; after
//! exhaustion the error is returned to the caller, which records it against
//! the single unit being processed rather than aborting the whole run.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (delay *= multiplier after each retry).
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Set the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed after all attempts.
    Failed { last_error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Convert to a Result, discarding attempt information.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed { last_error, .. } => Err(last_error),
        }
    }
}

/// Determines if an error is worth retrying.
pub trait Retryable {
    /// Returns true if the operation should be retried.
    fn is_retryable(&self) -> bool;
}

impl Retryable for anyhow::Error {
    fn is_retryable(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        msg.contains("timeout")
            || msg.contains("connection refused")
            || msg.contains("connection reset")
            || msg.contains("temporarily unavailable")
            || msg.contains("service unavailable")
            || msg.contains("too many requests")
    }
}

/// Execute an async operation with exponential backoff retry.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    E: Retryable + std::fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(error) => {
                if attempts >= config.max_attempts || !error.is_retryable() {
                    return RetryResult::Failed {
                        last_error: error,
                        attempts,
                    };
                }

                // Jitter to avoid thundering herd against a recovering backend
                let jitter_ms = rand_jitter(delay.as_millis() as u64 / 4);
                sleep(delay + Duration::from_millis(jitter_ms)).await;

                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.multiplier)
                    .min(config.max_delay);
            }
        }
    }
}

/// Execute an async operation with default retry configuration.
pub async fn retry<T, E, F, Fut>(operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry(&RetryConfig::default(), operation)
        .await
        .into_result()
}

fn rand_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    // Not cryptographic, fine for jitter
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    seed % max
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FlakyError(String);

    impl Retryable for FlakyError {
        fn is_retryable(&self) -> bool {
            self.0.contains("transient")
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&RetryConfig::new(3), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FlakyError>(42)
        })
        .await;

        match result {
            RetryResult::Success(v) => assert_eq!(v, 42),
            _ => panic!("expected success"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let counter = AtomicU32::new(0);
        let result = with_retry(
            &RetryConfig::new(3).with_initial_delay(Duration::from_millis(10)),
            || async {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(FlakyError("transient error".to_string()))
                } else {
                    Ok("done")
                }
            },
        )
        .await;

        match result {
            RetryResult::Success(v) => assert_eq!(v, "done"),
            _ => panic!("expected success"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&RetryConfig::new(3), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(FlakyError("permanent error".to_string()))
        })
        .await;

        match result {
            RetryResult::Failed { attempts, .. } => assert_eq!(attempts, 1),
            _ => panic!("expected failure"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let counter = AtomicU32::new(0);
        let result = with_retry(
            &RetryConfig::new(3).with_initial_delay(Duration::from_millis(10)),
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FlakyError("transient error".to_string()))
            },
        )
        .await;

        match result {
            RetryResult::Failed { attempts, .. } => assert_eq!(attempts, 3),
            _ => panic!("expected failure"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
