//! Exponential-backoff retry around a fallible async call.
//!
//! This is the only place in the crate where a transient failure turns into
//! sleep-then-retry. Attempts run strictly one after another; the caller's
//! task is suspended for the whole backoff delay.

use crate::error::{GatewayError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Delay schedule and attempt budget for [`BackoffExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Adds up to 10% random extra delay when set.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay applied after the failed attempt with the given zero-based index.
    ///
    /// Without jitter this is `base_delay * 2^index`, capped at `max_delay`.
    pub fn delay_for(&self, index: u32) -> Duration {
        let factor = 2u32.saturating_pow(index);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let extra = rand::thread_rng().gen_range(0.0..0.1);
            delay.mul_f64(1.0 + extra).min(self.max_delay)
        } else {
            delay
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Record of one attempt made by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// Zero-based attempt index.
    pub index: u32,
    /// Backoff slept after this attempt (zero for the final one).
    pub delay: Duration,
    /// Error kind and message if this attempt was the final, failing one.
    pub terminal_error: Option<String>,
    /// Whether this attempt succeeded.
    pub succeeded: bool,
}

/// Outcome of [`BackoffExecutor::execute_traced`].
#[derive(Debug)]
pub struct Traced<T> {
    pub result: Result<T>,
    pub attempts: Vec<RetryAttempt>,
}

/// Runs an operation until it succeeds, fails fast, or runs out of attempts.
#[derive(Debug, Clone, Default)]
pub struct BackoffExecutor {
    policy: BackoffPolicy,
}

impl BackoffExecutor {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Executes `operation` with retries.
    ///
    /// Errors for which [`GatewayError::is_retryable`] is false are returned
    /// unchanged after the attempt that raised them. When every attempt fails
    /// with a retryable error the result is [`GatewayError::RetryExhausted`]
    /// wrapping the last error.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_traced(operation).await.result
    }

    /// Like [`execute`](Self::execute), but also returns every attempt made.
    pub async fn execute_traced<F, Fut, T>(&self, mut operation: F) -> Traced<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.attempts();
        let mut attempts = Vec::new();
        let mut index = 0;

        loop {
            match operation(index).await {
                Ok(output) => {
                    if index > 0 {
                        tracing::info!(
                            attempt = index + 1,
                            max_attempts,
                            "operation succeeded after retry"
                        );
                    }
                    attempts.push(RetryAttempt {
                        index,
                        delay: Duration::ZERO,
                        terminal_error: None,
                        succeeded: true,
                    });
                    return Traced {
                        result: Ok(output),
                        attempts,
                    };
                }
                Err(e) if e.is_retryable() && index + 1 < max_attempts => {
                    let delay = self.policy.delay_for(index);
                    tracing::warn!(
                        attempt = index + 1,
                        max_attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "operation failed, backing off"
                    );
                    attempts.push(RetryAttempt {
                        index,
                        delay,
                        terminal_error: None,
                        succeeded: false,
                    });
                    tokio::time::sleep(delay).await;
                    index += 1;
                }
                Err(e) => {
                    attempts.push(RetryAttempt {
                        index,
                        delay: Duration::ZERO,
                        terminal_error: Some(format!("{}: {}", e.kind(), e)),
                        succeeded: false,
                    });

                    let result = if e.is_retryable() {
                        tracing::error!(
                            attempts = index + 1,
                            error = %e,
                            "operation failed, retries exhausted"
                        );
                        Err(GatewayError::RetryExhausted {
                            attempts: index + 1,
                            last_error: Box::new(e),
                        })
                    } else {
                        tracing::error!(
                            attempt = index + 1,
                            kind = e.kind(),
                            error = %e,
                            "operation failed with non-retryable error"
                        );
                        Err(e)
                    };

                    return Traced { result, attempts };
                }
            }
        }
    }
}
