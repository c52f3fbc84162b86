//! The three-state fault-detector state machine.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use resilience_core::CancellationToken;

use crate::config::CircuitBreakerConfig;
use crate::error::CircuitBreakerError;
use crate::events::CircuitBreakerEvent;

/// Which of the three states the breaker is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls are admitted; outcomes are counted toward the trip decision.
    Closed,
    /// Calls are rejected until the (jittered) timeout elapses.
    Open,
    /// A bounded number of probe calls are admitted to test recovery.
    HalfOpen,
}

/// Outcome counters for the current counting window.
///
/// `requests` always equals `total_successes + total_failures`;
/// `consecutive_successes`/`consecutive_failures` reset to 0 on the
/// opposite outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitCounts {
    /// Total counted outcomes since the last reset.
    pub requests: u64,
    /// Total counted successes since the last reset.
    pub total_successes: u64,
    /// Total counted failures since the last reset.
    pub total_failures: u64,
    /// Consecutive successes immediately before now.
    pub consecutive_successes: u64,
    /// Consecutive failures immediately before now.
    pub consecutive_failures: u64,
}

impl CircuitCounts {
    fn record_success(&mut self) {
        self.requests += 1;
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self) {
        self.requests += 1;
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    fn reset(&mut self) {
        *self = CircuitCounts::default();
    }
}

struct Inner {
    state: CircuitState,
    counts: CircuitCounts,
    opened_at: Option<Instant>,
    open_deadline: Option<Instant>,
    half_open_in_flight: usize,
}

/// A three-state fault detector around `execute`.
///
/// Admission in CLOSED always succeeds; in OPEN it succeeds only after the
/// (jittered) timeout elapses, at which point the breaker moves to
/// HALF_OPEN; in HALF_OPEN it succeeds only while fewer than
/// `half_open_max_requests` probes are in flight.
pub struct CircuitBreaker<E> {
    config: Arc<CircuitBreakerConfig<E>>,
    inner: Mutex<Inner>,
    periodic_reset: Mutex<Option<tokio::task::JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl<E> CircuitBreaker<E>
where
    E: Send + 'static,
{
    /// Creates a new circuit breaker from `config`, starting CLOSED.
    ///
    /// If `config.interval` is set, spawns a background task that zeroes
    /// counts every interval while CLOSED; stop it with [`destroy`](Self::destroy).
    pub fn new(config: CircuitBreakerConfig<E>) -> Arc<Self> {
        let breaker = Arc::new(Self {
            config: Arc::new(config),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                counts: CircuitCounts::default(),
                opened_at: None,
                open_deadline: None,
                half_open_in_flight: 0,
            }),
            periodic_reset: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });

        if let Some(interval) = breaker.config.interval {
            let weak = Arc::downgrade(&breaker);
            let handle = tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    let Some(breaker) = weak.upgrade() else {
                        return;
                    };
                    let mut inner = breaker.inner.lock().expect("circuit breaker lock poisoned");
                    if inner.state == CircuitState::Closed {
                        inner.counts.reset();
                    }
                }
            });
            *breaker.periodic_reset.lock().expect("periodic reset lock poisoned") = Some(handle);
        }

        breaker
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker lock poisoned").state
    }

    /// A snapshot of the current outcome counters.
    pub fn counts(&self) -> CircuitCounts {
        self.inner.lock().expect("circuit breaker lock poisoned").counts
    }

    /// Forces the breaker back to CLOSED and zeroes counts. Fires
    /// `on_state_change` (deferred) only if the state was not already
    /// CLOSED.
    pub fn reset(self: &Arc<Self>) {
        let transition = {
            let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
            let from = inner.state;
            if from == CircuitState::Closed {
                None
            } else {
                inner.state = CircuitState::Closed;
                inner.counts.reset();
                inner.opened_at = None;
                inner.open_deadline = None;
                inner.half_open_in_flight = 0;
                Some(from)
            }
        };

        if let Some(from) = transition {
            self.emit_transition_deferred(from, CircuitState::Closed);
        }
    }

    /// Stops the periodic-reset background task, if any. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self
            .periodic_reset
            .lock()
            .expect("periodic reset lock poisoned")
            .take()
        {
            handle.abort();
        }
    }

    /// Runs `op` under the breaker's admission policy.
    pub async fn execute<F, Fut, T>(
        self: &Arc<Self>,
        op: F,
        token: CancellationToken,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if token.tripped() {
            return Err(CircuitBreakerError::Cancelled);
        }

        let admitted = self.try_admit();
        let Some(probe_state) = admitted else {
            self.emit_rejected();
            return Err(CircuitBreakerError::CircuitOpen {
                name: self.config.name.clone(),
            });
        };
        self.emit_permitted(probe_state);

        let result = op(token.clone()).await;

        if token.tripped() {
            self.release_half_open_slot_if_needed(probe_state);
            return Err(CircuitBreakerError::Cancelled);
        }

        let is_success = match &result {
            Ok(_) => self.config.is_successful(None),
            Err(e) => self.config.is_successful(Some(e)),
        };
        self.record_outcome(is_success, probe_state);

        result.map_err(CircuitBreakerError::Inner)
    }

    /// Returns `Some(state_at_admission)` if the call is admitted, `None`
    /// if rejected. On an OPEN→HALF_OPEN transition, admits the caller
    /// that observed the expired timeout and returns `HalfOpen`.
    fn try_admit(self: &Arc<Self>) -> Option<CircuitState> {
        let mut transition = None;
        let result = {
            let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
            match inner.state {
                CircuitState::Closed => Some(CircuitState::Closed),
                CircuitState::Open => {
                    let deadline = inner.open_deadline.expect("open state always sets a deadline");
                    if Instant::now() >= deadline {
                        inner.state = CircuitState::HalfOpen;
                        inner.half_open_in_flight = 1;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                        Some(CircuitState::HalfOpen)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.half_open_in_flight < self.config.half_open_max_requests {
                        inner.half_open_in_flight += 1;
                        Some(CircuitState::HalfOpen)
                    } else {
                        None
                    }
                }
            }
        };

        if let Some((from, to)) = transition {
            self.emit_transition_deferred(from, to);
        }
        result
    }

    fn release_half_open_slot_if_needed(&self, probe_state: CircuitState) {
        if probe_state != CircuitState::HalfOpen {
            return;
        }
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    fn record_outcome(self: &Arc<Self>, is_success: bool, probe_state: CircuitState) {
        let mut transition = None;
        {
            let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");

            if probe_state == CircuitState::HalfOpen && inner.state == CircuitState::HalfOpen {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }

            match inner.state {
                CircuitState::HalfOpen => {
                    if is_success {
                        inner.state = CircuitState::Closed;
                        inner.counts.reset();
                        inner.opened_at = None;
                        inner.open_deadline = None;
                        inner.half_open_in_flight = 0;
                        transition = Some((CircuitState::HalfOpen, CircuitState::Closed));
                    } else {
                        self.open_from(&mut inner);
                        transition = Some((CircuitState::HalfOpen, CircuitState::Open));
                    }
                }
                CircuitState::Closed => {
                    if is_success {
                        inner.counts.record_success();
                    } else {
                        inner.counts.record_failure();
                        if self.config.ready_to_trip(&inner.counts) {
                            self.open_from(&mut inner);
                            transition = Some((CircuitState::Closed, CircuitState::Open));
                        }
                    }
                }
                CircuitState::Open => {
                    // A result landing here raced a reset(); nothing to do.
                }
            }
        }

        self.emit_outcome(is_success, probe_state);
        if let Some((from, to)) = transition {
            self.emit_transition_deferred(from, to);
        }
    }

    /// Transitions `inner` to OPEN, sampling fresh jitter. Resampled on
    /// every transition *into* OPEN, including repeated HALF_OPEN→OPEN
    /// bounces: a stale sample from an earlier open period has no bearing
    /// on a fresh one.
    fn open_from(&self, inner: &mut Inner) {
        let jitter = if self.config.timeout_jitter > 0.0 {
            let max_jitter_ms = self.config.timeout.as_millis() as f64 * self.config.timeout_jitter;
            Duration::from_millis(rand::random::<f64>().mul_add(max_jitter_ms, 0.0) as u64)
        } else {
            Duration::ZERO
        };
        let now = Instant::now();
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.open_deadline = Some(now + self.config.timeout + jitter);
        inner.counts.reset();
        inner.half_open_in_flight = 0;
    }

    fn emit_permitted(&self, state: CircuitState) {
        self.config.event_listeners.emit(&CircuitBreakerEvent::CallPermitted {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            state,
        });
        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_permitted_total", "circuitbreaker" => self.config.name.clone())
            .increment(1);
    }

    fn emit_rejected(&self) {
        let state = self.state();
        self.config.event_listeners.emit(&CircuitBreakerEvent::CallRejected {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            state,
        });
        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_rejected_total", "circuitbreaker" => self.config.name.clone())
            .increment(1);
    }

    fn emit_outcome(&self, is_success: bool, state: CircuitState) {
        let event = if is_success {
            CircuitBreakerEvent::SuccessRecorded {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
                state,
            }
        } else {
            CircuitBreakerEvent::FailureRecorded {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
                state,
            }
        };
        self.config.event_listeners.emit(&event);

        #[cfg(feature = "metrics")]
        {
            let outcome = if is_success { "success" } else { "failure" };
            counter!(
                "circuitbreaker_calls_total",
                "circuitbreaker" => self.config.name.clone(),
                "outcome" => outcome
            )
            .increment(1);
        }
    }

    /// Emits a `StateTransition` event on a spawned task so it never runs
    /// reentrantly inside the call that triggered it.
    fn emit_transition_deferred(self: &Arc<Self>, from: CircuitState, to: CircuitState) {
        #[cfg(feature = "tracing")]
        tracing::info!(breaker = %self.config.name, ?from, ?to, "circuit breaker state transition");

        #[cfg(feature = "metrics")]
        {
            gauge!("circuitbreaker_state", "circuitbreaker" => self.config.name.clone())
                .set(match to {
                    CircuitState::Closed => 0.0,
                    CircuitState::Open => 1.0,
                    CircuitState::HalfOpen => 2.0,
                });
        }

        let breaker = Arc::clone(self);
        tokio::spawn(async move {
            breaker.config.event_listeners.emit(&CircuitBreakerEvent::StateTransition {
                pattern_name: breaker.config.name.clone(),
                timestamp: Instant::now(),
                from_state: from,
                to_state: to,
            });
        });
    }
}

impl<E> Drop for CircuitBreaker<E> {
    fn drop(&mut self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            if let Some(handle) = self
                .periodic_reset
                .lock()
                .expect("periodic reset lock poisoned")
                .take()
            {
                handle.abort();
            }
        }
    }
}
