//! Bounded-attempt retry driver.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use resilience_core::{CancellationToken, RetryableError};

use crate::backoff::{apply_jitter, base_delay};
use crate::config::RetryConfig;
use crate::error::RetryError;
use crate::events::RetryEvent;

/// Lets an error type expose an explicit retryability verdict to the retry
/// driver, consulted before any configured `is_retryable` predicate.
///
/// The default implementation defers entirely to the driver's own
/// classification. [`resilience_core::RetryableError`] overrides it to
/// surface its `retryable` flag.
pub trait Retryable {
    /// Returns `Some(true/false)` if this error already knows whether it
    /// should be retried, or `None` to defer to the driver.
    fn explicit_retryable(&self) -> Option<bool> {
        None
    }
}

impl<E> Retryable for RetryableError<E> {
    fn explicit_retryable(&self) -> Option<bool> {
        Some(self.retryable)
    }
}

/// Runs an operation up to `max_attempts` times, backing off between
/// failures per the configured policy and jitter.
pub struct Retry<E> {
    config: Arc<RetryConfig<E>>,
}

impl<E> Retry<E> {
    /// Creates a new retry driver from `config`.
    pub fn new(config: RetryConfig<E>) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Total configured attempt budget, including the initial attempt.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Runs `op`, retrying on retryable failures until it succeeds, an
    /// error is classified non-retryable, or the attempt budget is
    /// exhausted.
    ///
    /// `op` receives a clone of `token` on every attempt; the driver itself
    /// checks `token` before each attempt and while sleeping between
    /// attempts.
    pub async fn execute<F, Fut, T>(
        &self,
        op: F,
        token: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: Fn(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut prev_delay = self.config.initial_delay;

        for attempt in 1..=self.config.max_attempts {
            if token.tripped() {
                return Err(RetryError::Cancelled);
            }

            match op(token.clone()).await {
                Ok(value) => {
                    self.emit_success(attempt);
                    return Ok(value);
                }
                Err(error) => {
                    let explicit = error.explicit_retryable();
                    let retryable = self.config.classify_retryable(explicit, &error);

                    if !retryable {
                        self.emit_non_retryable();
                        return Err(RetryError::Inner(error));
                    }

                    if attempt == self.config.max_attempts {
                        self.emit_exhausted(attempt);
                        return Err(RetryError::MaxAttemptsReached {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let base = base_delay(
                        self.config.backoff_policy,
                        self.config.initial_delay,
                        attempt,
                        self.config.max_delay,
                    );
                    let (delay, next_prev) = apply_jitter(self.config.jitter, base, prev_delay);
                    prev_delay = next_prev;

                    if resilience_core::sleep(delay, token).await.is_err() {
                        return Err(RetryError::Cancelled);
                    }

                    self.emit_retry(attempt, delay);
                }
            }
        }

        unreachable!("loop always returns by the final attempt")
    }

    fn emit_retry(&self, attempt: u32, delay: Duration) {
        self.config.event_listeners.emit(&RetryEvent::Retry {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            attempt,
            delay,
        });
    }

    fn emit_success(&self, attempts: u32) {
        self.config.event_listeners.emit(&RetryEvent::Success {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            attempts,
        });
    }

    fn emit_exhausted(&self, attempts: u32) {
        self.config.event_listeners.emit(&RetryEvent::Exhausted {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            attempts,
        });
    }

    fn emit_non_retryable(&self) {
        self.config.event_listeners.emit(&RetryEvent::NonRetryable {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
        });
    }
}
