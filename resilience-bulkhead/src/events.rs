//! Events emitted by [`crate::Bulkhead`].

use std::time::{Duration, Instant};

use resilience_core::ResilienceEvent;

/// Observability events emitted by a bulkhead instance.
#[derive(Debug, Clone)]
pub enum BulkheadEvent {
    /// A call was admitted and given an execution permit.
    CallPermitted {
        /// Name of the emitting bulkhead.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Concurrent calls in flight right after this admission.
        active_count: usize,
    },
    /// A call was queued because no execution permit was immediately
    /// available.
    CallQueued {
        /// Name of the emitting bulkhead.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Callers currently queued right after this enqueue.
        queued_count: usize,
    },
    /// A call was rejected: capacity and queue (if any) were both full, or
    /// a queued call's wait timed out, or the bulkhead was closed.
    CallRejected {
        /// Name of the emitting bulkhead.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Concurrent calls in flight at the moment of rejection.
        active_count: usize,
        /// Callers queued at the moment of rejection.
        queued_count: usize,
    },
    /// A permitted call completed successfully.
    CallFinished {
        /// Name of the emitting bulkhead.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// How long the call took from admission to completion.
        duration: Duration,
    },
    /// A permitted call completed with an error.
    CallFailed {
        /// Name of the emitting bulkhead.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// How long the call took from admission to failure.
        duration: Duration,
    },
}

impl ResilienceEvent for BulkheadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BulkheadEvent::CallPermitted { .. } => "call_permitted",
            BulkheadEvent::CallQueued { .. } => "call_queued",
            BulkheadEvent::CallRejected { .. } => "call_rejected",
            BulkheadEvent::CallFinished { .. } => "call_finished",
            BulkheadEvent::CallFailed { .. } => "call_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BulkheadEvent::CallPermitted { timestamp, .. }
            | BulkheadEvent::CallQueued { timestamp, .. }
            | BulkheadEvent::CallRejected { timestamp, .. }
            | BulkheadEvent::CallFinished { timestamp, .. }
            | BulkheadEvent::CallFailed { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            BulkheadEvent::CallPermitted { pattern_name, .. }
            | BulkheadEvent::CallQueued { pattern_name, .. }
            | BulkheadEvent::CallRejected { pattern_name, .. }
            | BulkheadEvent::CallFinished { pattern_name, .. }
            | BulkheadEvent::CallFailed { pattern_name, .. } => pattern_name,
        }
    }
}
