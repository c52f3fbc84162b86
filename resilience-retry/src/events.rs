//! Events emitted by [`crate::Retry`].

use std::time::{Duration, Instant};

use resilience_core::ResilienceEvent;

/// Observability events emitted by a retry driver instance.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// An attempt failed and a retry will follow after `delay`.
    Retry {
        /// Name of the emitting retry driver.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// The attempt number that just failed (1-indexed).
        attempt: u32,
        /// How long the driver will sleep before the next attempt.
        delay: Duration,
    },
    /// The operation succeeded, possibly after retries.
    Success {
        /// Name of the emitting retry driver.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Total attempts made, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed and the attempt budget is exhausted.
    Exhausted {
        /// Name of the emitting retry driver.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Total attempts made.
        attempts: u32,
    },
    /// An error was classified non-retryable and returned without a retry.
    NonRetryable {
        /// Name of the emitting retry driver.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::NonRetryable { .. } => "non_retryable",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::NonRetryable { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RetryEvent::Retry { pattern_name, .. }
            | RetryEvent::Success { pattern_name, .. }
            | RetryEvent::Exhausted { pattern_name, .. }
            | RetryEvent::NonRetryable { pattern_name, .. } => pattern_name,
        }
    }
}
