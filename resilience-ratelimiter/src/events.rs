//! Events emitted by [`crate::RateLimiter`].

use std::time::{Duration, Instant};

use resilience_core::ResilienceEvent;

/// Observability events emitted by a rate limiter instance.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A request was admitted.
    Allowed {
        /// Name of the emitting limiter.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// The (sanitized) key that was admitted.
        key: String,
    },
    /// A request was denied because the bucket had no tokens left.
    Denied {
        /// Name of the emitting limiter.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// The (sanitized) key that was denied.
        key: String,
    },
    /// A storage adapter call failed.
    StorageError {
        /// Name of the emitting limiter.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// The storage operation that failed.
        operation: &'static str,
        /// A description of the failure.
        cause: String,
    },
    /// A storage adapter call completed, successfully or not.
    StorageLatency {
        /// Name of the emitting limiter.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// The storage operation that was timed.
        operation: &'static str,
        /// How long the call took.
        duration: Duration,
    },
}

impl ResilienceEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::Allowed { .. } => "allowed",
            RateLimiterEvent::Denied { .. } => "denied",
            RateLimiterEvent::StorageError { .. } => "storage_error",
            RateLimiterEvent::StorageLatency { .. } => "storage_latency",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::Allowed { timestamp, .. }
            | RateLimiterEvent::Denied { timestamp, .. }
            | RateLimiterEvent::StorageError { timestamp, .. }
            | RateLimiterEvent::StorageLatency { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimiterEvent::Allowed { pattern_name, .. }
            | RateLimiterEvent::Denied { pattern_name, .. }
            | RateLimiterEvent::StorageError { pattern_name, .. }
            | RateLimiterEvent::StorageLatency { pattern_name, .. } => pattern_name,
        }
    }
}
