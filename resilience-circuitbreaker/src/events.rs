//! Events emitted by [`crate::CircuitBreaker`].

use std::time::Instant;

use resilience_core::ResilienceEvent;

use crate::circuit::CircuitState;

/// Observability events emitted by a circuit breaker instance.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The breaker transitioned from one state to another.
    StateTransition {
        /// Name of the emitting breaker.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State before the transition.
        from_state: CircuitState,
        /// State after the transition.
        to_state: CircuitState,
    },
    /// A call was admitted.
    CallPermitted {
        /// Name of the emitting breaker.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State at the moment of admission.
        state: CircuitState,
    },
    /// A call was rejected because the breaker is open or the half-open
    /// probe budget is exhausted.
    CallRejected {
        /// Name of the emitting breaker.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State at the moment of rejection.
        state: CircuitState,
    },
    /// An admitted call was classified as a success.
    SuccessRecorded {
        /// Name of the emitting breaker.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State at the moment the outcome was recorded.
        state: CircuitState,
    },
    /// An admitted call was classified as a failure.
    FailureRecorded {
        /// Name of the emitting breaker.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State at the moment the outcome was recorded.
        state: CircuitState,
    },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { pattern_name, .. }
            | CircuitBreakerEvent::CallPermitted { pattern_name, .. }
            | CircuitBreakerEvent::CallRejected { pattern_name, .. }
            | CircuitBreakerEvent::SuccessRecorded { pattern_name, .. }
            | CircuitBreakerEvent::FailureRecorded { pattern_name, .. } => pattern_name,
        }
    }
}
