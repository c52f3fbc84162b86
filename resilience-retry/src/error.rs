//! Error types for the retry driver.

use thiserror::Error;

/// Errors returned by [`crate::Retry::execute`].
#[derive(Debug, Clone, Error)]
pub enum RetryError<E> {
    /// Every attempt failed and the configured attempt budget is exhausted.
    #[error("max attempts reached ({attempts}), last error: {last_error}")]
    MaxAttemptsReached {
        /// Total attempts made.
        attempts: u32,
        /// The error returned by the final attempt.
        last_error: E,
    },

    /// The caller's own cancellation token was tripped.
    #[error("operation was cancelled")]
    Cancelled,

    /// An attempt failed with an error classified non-retryable; returned
    /// without consuming further attempts.
    #[error(transparent)]
    Inner(E),
}

impl<E> RetryError<E> {
    /// Returns `true` if the attempt budget was exhausted.
    pub fn is_max_attempts_reached(&self) -> bool {
        matches!(self, RetryError::MaxAttemptsReached { .. })
    }

    /// Returns `true` if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }

    /// Extracts the wrapped application error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::MaxAttemptsReached { last_error, .. } => Some(last_error),
            RetryError::Inner(e) => Some(e),
            RetryError::Cancelled => None,
        }
    }
}
