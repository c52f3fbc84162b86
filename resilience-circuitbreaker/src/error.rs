//! Error types for the circuit breaker pattern.

use thiserror::Error;

/// Errors returned by [`crate::CircuitBreaker::execute`].
#[derive(Debug, Clone, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open, or half-open and its probe budget is exhausted.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen {
        /// Name of the breaker that rejected the call.
        name: String,
    },

    /// The caller's own cancellation token was tripped.
    #[error("operation was cancelled")]
    Cancelled,

    /// The wrapped operation returned an error.
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Returns `true` if admission was refused because the circuit is open.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }

    /// Returns the inner error, if this wraps one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
