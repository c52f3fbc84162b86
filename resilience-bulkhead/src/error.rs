//! Error types for the bulkhead pattern.

use thiserror::Error;

/// Errors returned by [`crate::Bulkhead::execute`].
#[derive(Debug, Clone, Error)]
pub enum BulkheadError<E> {
    /// Admission refused because both the execution slots and the
    /// admission queue are full.
    #[error("bulkhead full: {active_count} active, {queued_count} queued")]
    BulkheadFull {
        /// Number of operations currently executing.
        active_count: usize,
        /// Number of operations currently queued.
        queued_count: usize,
    },

    /// Admission refused because [`crate::Bulkhead::close`] was called.
    #[error("bulkhead is closed")]
    BulkheadClosed,

    /// A queued caller's `queue_timeout` elapsed before a permit freed up.
    #[error("timed out waiting in the bulkhead queue")]
    QueueTimeout,

    /// The caller's own cancellation token was tripped.
    #[error("operation was cancelled")]
    Cancelled,

    /// The wrapped operation returned an error.
    #[error(transparent)]
    Inner(E),
}

impl<E> BulkheadError<E> {
    /// Returns `true` if admission was refused due to capacity.
    pub fn is_bulkhead_full(&self) -> bool {
        matches!(self, BulkheadError::BulkheadFull { .. })
    }

    /// Returns `true` if the bulkhead was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, BulkheadError::BulkheadClosed)
    }

    /// Returns the inner error, if this wraps one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BulkheadError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
