//! Common error types shared across resilience patterns.
//!
//! [`ResilienceError`] lets callers compose multiple patterns (bulkhead,
//! circuit breaker, rate limiter, retry) behind a single error type without
//! writing a `From` impl per layer, mirroring the per-layer error enums each
//! pattern crate also exposes for callers who only use one pattern.

use std::fmt;
use std::time::Duration;

/// A common error type that wraps every pattern's rejection reasons plus the
/// wrapped operation's own error.
///
/// # Type Parameters
///
/// - `E`: the application error type returned by the wrapped operation.
#[derive(Debug, Clone)]
pub enum ResilienceError<E> {
    /// The bulkhead rejected the call: it is at capacity and the admission
    /// queue, if any, is also full or the queue wait timed out.
    BulkheadFull {
        /// Current number of concurrent calls.
        concurrent_calls: usize,
        /// Maximum allowed concurrent calls.
        max_concurrent: usize,
    },

    /// The circuit breaker rejected the call because it is open.
    CircuitOpen {
        /// Circuit breaker name, if configured.
        name: Option<String>,
    },

    /// The rate limiter rejected the call.
    RateLimited {
        /// How long to wait before retrying, if known.
        retry_after: Option<Duration>,
    },

    /// The retry driver exhausted its configured attempt budget.
    MaxAttemptsReached {
        /// Number of attempts that were made.
        attempts: u32,
    },

    /// A timeout occurred while waiting for admission (e.g. bulkhead queue).
    Timeout {
        /// The component that timed out (e.g. "bulkhead", "rate_limiter").
        layer: &'static str,
    },

    /// The operation was cancelled via its [`crate::CancellationToken`].
    Cancelled,

    /// The underlying operation returned an application error.
    Application(E),
}

impl<E> fmt::Display for ResilienceError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceError::BulkheadFull {
                concurrent_calls,
                max_concurrent,
            } => write!(f, "bulkhead full ({concurrent_calls}/{max_concurrent})"),
            ResilienceError::CircuitOpen { name } => match name {
                Some(n) => write!(f, "circuit breaker '{n}' is open"),
                None => write!(f, "circuit breaker is open"),
            },
            ResilienceError::RateLimited { retry_after } => match retry_after {
                Some(d) => write!(f, "rate limited, retry after {d:?}"),
                None => write!(f, "rate limited"),
            },
            ResilienceError::MaxAttemptsReached { attempts } => {
                write!(f, "max attempts reached ({attempts})")
            }
            ResilienceError::Timeout { layer } => write!(f, "timeout in {layer}"),
            ResilienceError::Cancelled => write!(f, "operation was cancelled"),
            ResilienceError::Application(e) => write!(f, "application error: {e}"),
        }
    }
}

impl<E> std::error::Error for ResilienceError<E> where E: std::error::Error {}

impl<E> ResilienceError<E> {
    /// Returns `true` if this is a bulkhead rejection.
    pub fn is_bulkhead_full(&self) -> bool {
        matches!(self, ResilienceError::BulkheadFull { .. })
    }

    /// Returns `true` if this is a circuit breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Returns `true` if this is a rate limiter rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ResilienceError::RateLimited { .. })
    }

    /// Returns `true` if the retry driver exhausted its attempts.
    pub fn is_max_attempts_reached(&self) -> bool {
        matches!(self, ResilienceError::MaxAttemptsReached { .. })
    }

    /// Returns `true` if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// Returns `true` if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled)
    }

    /// Returns `true` if this is an application error.
    pub fn is_application(&self) -> bool {
        matches!(self, ResilienceError::Application(_))
    }

    /// Extracts the application error, if this is an `Application` variant.
    pub fn application_error(self) -> Option<E> {
        match self {
            ResilienceError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the application error using a function.
    ///
    /// ```
    /// use resilience_core::ResilienceError;
    ///
    /// let err: ResilienceError<String> = ResilienceError::Application("error".to_string());
    /// let mapped: ResilienceError<usize> = err.map_application(|s| s.len());
    /// assert_eq!(mapped.application_error(), Some(5));
    /// ```
    pub fn map_application<F, T>(self, f: F) -> ResilienceError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            ResilienceError::BulkheadFull {
                concurrent_calls,
                max_concurrent,
            } => ResilienceError::BulkheadFull {
                concurrent_calls,
                max_concurrent,
            },
            ResilienceError::CircuitOpen { name } => ResilienceError::CircuitOpen { name },
            ResilienceError::RateLimited { retry_after } => {
                ResilienceError::RateLimited { retry_after }
            }
            ResilienceError::MaxAttemptsReached { attempts } => {
                ResilienceError::MaxAttemptsReached { attempts }
            }
            ResilienceError::Timeout { layer } => ResilienceError::Timeout { layer },
            ResilienceError::Cancelled => ResilienceError::Cancelled,
            ResilienceError::Application(e) => ResilienceError::Application(f(e)),
        }
    }
}

/// Wraps an error with an explicit retryability verdict.
///
/// The retry driver consults this before falling back to a caller-supplied
/// `is_retryable` predicate or its own default-retryable policy (spec.md
/// §7): an operation that already knows whether its own failure is worth
/// retrying (e.g. a parsed HTTP status) can say so directly instead of
/// making the retry driver re-derive it from the error value.
#[derive(Debug, Clone)]
pub struct RetryableError<E> {
    /// The underlying error.
    pub cause: E,
    /// Whether the retry driver should attempt this operation again.
    pub retryable: bool,
}

impl<E> RetryableError<E> {
    /// Wraps `cause` as retryable.
    pub fn retryable(cause: E) -> Self {
        Self {
            cause,
            retryable: true,
        }
    }

    /// Wraps `cause` as non-retryable.
    pub fn non_retryable(cause: E) -> Self {
        Self {
            cause,
            retryable: false,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryableError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cause.fmt(f)
    }
}

impl<E> std::error::Error for RetryableError<E> where E: std::error::Error {}

/// A config builder's field failed validation at `build()` time.
///
/// Every pattern's builder validates its numeric bounds here rather than
/// panicking, so misconfiguration surfaces as an ordinary `Result` at
/// construction time instead of as a runtime panic deep inside a call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A field's value fell outside its allowed range.
    #[error("`{field}` must be {constraint}, got {value}")]
    OutOfRange {
        /// The offending field name.
        field: &'static str,
        /// A human-readable description of the allowed range.
        constraint: &'static str,
        /// The value that was rejected, formatted for display.
        value: String,
    },

    /// A field combination is mutually inconsistent.
    #[error("invalid configuration: {0}")]
    Inconsistent(String),
}

impl ConfigError {
    /// Builds an [`ConfigError::OutOfRange`] from a displayable value.
    pub fn out_of_range(
        field: &'static str,
        constraint: &'static str,
        value: impl fmt::Display,
    ) -> Self {
        ConfigError::OutOfRange {
            field,
            constraint,
            value: value.to_string(),
        }
    }
}
