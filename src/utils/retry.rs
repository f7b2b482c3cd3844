//! Retry utilities for resilient operations
//!
//! Every network operation in the downloader shares one retry shape: a fixed
//! number of total attempts separated by a constant delay. The delay does not
//! grow between attempts; the upstream portals respond better to steady pacing
//! than to bursts followed by long pauses.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Constant delay between two consecutive attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(20),
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with custom attempts and delay
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Configuration without any waiting, for tests and local mirrors
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

/// Execute an operation with retry logic and a constant inter-attempt delay
///
/// The operation receives the 1-based attempt number. Returns the first
/// success, or the error of the last attempt once the budget is exhausted.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(config, operation, |_| true).await
}

/// Execute an operation with retry logic, using a custom retry predicate
///
/// Errors for which `should_retry` returns false are returned immediately,
/// without consuming the rest of the attempt budget.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    warn!(error = %e, "Non-retryable error encountered");
                    return Err(e);
                }

                if attempt >= max_attempts {
                    warn!(attempt, max_attempts, error = %e, "Retry budget exhausted");
                    return Err(e);
                }

                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = config.delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, will retry"
                );
                if !config.delay.is_zero() {
                    tokio::time::sleep(config.delay).await;
                }
                attempt += 1;
            }
        }
    }
}
