//! Exponential backoff for transient source failures

use std::future::Future;
use std::time::Duration;

use grove_core::error::GroveError;
use tracing::warn;

use crate::RegistryResult;

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let scaled = Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64);
        std::cmp::min(scaled, self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-recoverable error,
/// or runs out of attempts.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, label: &str, mut operation: F) -> RegistryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RegistryResult<T>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) if !error.is_recoverable() || attempt >= config.max_retries => {
                return Err(error);
            },
            Err(error) => {
                attempt += 1;
                warn!(
                    operation = label,
                    attempt,
                    max_retries = config.max_retries,
                    error = %error,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                delay = config.next_delay(delay);
            },
        }
    }
}

/// Error for an operation that exceeded its time limit
pub(crate) fn timeout_error(operation: &str, limit: Duration) -> GroveError {
    GroveError::Timeout {
        operation: operation.to_string(),
        seconds: limit.as_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(10));
        assert_eq!(config.multiplier, 2.0);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = fast();
        assert_eq!(config.next_delay(Duration::from_millis(1)), Duration::from_millis(2));
        assert_eq!(config.next_delay(Duration::from_millis(3)), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(), "flaky", || {
            let calls = &calls;
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GroveError::source_error("flaky", "connection reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: RegistryResult<()> = with_retry(&fast(), "missing", || {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GroveError::PackageNotFound {
                    name: "ghost".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(GroveError::PackageNotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: RegistryResult<()> = with_retry(&fast(), "down", || {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GroveError::source_error("down", "503"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
