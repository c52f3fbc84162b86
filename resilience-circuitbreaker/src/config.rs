//! Configuration for the circuit breaker pattern.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use resilience_core::{ConfigError, EventListeners, FnListener};

use crate::circuit::{CircuitCounts, CircuitState};
use crate::events::CircuitBreakerEvent;

type ReadyToTrip = Arc<dyn Fn(&CircuitCounts) -> bool + Send + Sync>;
type IsSuccessful<E> = Arc<dyn Fn(Option<&E>) -> bool + Send + Sync>;

/// Configuration for a [`crate::CircuitBreaker`].
pub struct CircuitBreakerConfig<E> {
    pub(crate) max_failures: u32,
    pub(crate) timeout: Duration,
    pub(crate) timeout_jitter: f64,
    pub(crate) half_open_max_requests: usize,
    pub(crate) interval: Option<Duration>,
    pub(crate) ready_to_trip: Option<ReadyToTrip>,
    pub(crate) is_successful: Option<IsSuccessful<E>>,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl<E> CircuitBreakerConfig<E> {
    /// Starts a new configuration builder with spec-default values.
    pub fn builder() -> CircuitBreakerConfigBuilder<E> {
        CircuitBreakerConfigBuilder::new()
    }

    /// Default breaker: `max_failures = 5`, `timeout = 60s`.
    pub fn default_preset() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Trips quickly: `max_failures = 3`. Use for calls where a failure is
    /// expensive or likely to cascade.
    pub fn sensitive() -> Result<Self, ConfigError> {
        Self::builder().max_failures(3).build()
    }

    /// Tolerates more failures before tripping: `max_failures = 20`. Use
    /// for flaky-but-cheap-to-retry downstreams.
    pub fn tolerant() -> Result<Self, ConfigError> {
        Self::builder().max_failures(20).build()
    }

    pub(crate) fn ready_to_trip(&self, counts: &CircuitCounts) -> bool {
        match &self.ready_to_trip {
            Some(f) => f(counts),
            None => counts.consecutive_failures >= self.max_failures,
        }
    }

    pub(crate) fn is_successful(&self, error: Option<&E>) -> bool {
        match &self.is_successful {
            Some(f) => f(error),
            None => error.is_none(),
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder<E> {
    max_failures: u32,
    timeout: Duration,
    timeout_jitter: f64,
    half_open_max_requests: usize,
    interval: Option<Duration>,
    ready_to_trip: Option<ReadyToTrip>,
    is_successful: Option<IsSuccessful<E>>,
    name: String,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl<E> CircuitBreakerConfigBuilder<E> {
    /// Creates a new builder with spec defaults: `max_failures = 5`,
    /// `timeout = 60s`, `timeout_jitter = 0.1`, `half_open_max_requests = 1`,
    /// periodic reset disabled.
    pub fn new() -> Self {
        Self {
            max_failures: 5,
            timeout: Duration::from_secs(60),
            timeout_jitter: 0.1,
            half_open_max_requests: 1,
            interval: None,
            ready_to_trip: None,
            is_successful: None,
            name: "circuit-breaker".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Number of consecutive failures in CLOSED that trips the breaker,
    /// when no custom `ready_to_trip` is set. Default 5.
    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// How long the breaker stays OPEN before admitting a half-open probe.
    /// Default 60s.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fraction of `timeout` added as random jitter on top of the base
    /// timeout, resampled every time the breaker transitions into OPEN.
    /// Must be in `[0, 1]`. Default 0.1.
    pub fn timeout_jitter(mut self, jitter: f64) -> Self {
        self.timeout_jitter = jitter;
        self
    }

    /// Maximum concurrent admissions while HALF_OPEN. Default 1.
    pub fn half_open_max_requests(mut self, max: usize) -> Self {
        self.half_open_max_requests = max;
        self
    }

    /// Periodically zeroes counts while CLOSED, every `interval`. `None`
    /// (the default) disables periodic reset.
    pub fn interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the trip decision consulted after each counted outcome in
    /// CLOSED. Default: `consecutive_failures >= max_failures`.
    pub fn ready_to_trip<F>(mut self, f: F) -> Self
    where
        F: Fn(&CircuitCounts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Some(Arc::new(f));
        self
    }

    /// Overrides outcome classification. Called with `None` on success and
    /// `Some(&error)` on failure; default treats every `Err` as a failure.
    pub fn is_successful<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&E>) -> bool + Send + Sync + 'static,
    {
        self.is_successful = Some(Arc::new(f));
        self
    }

    /// Sets the name used in events, logs, and [`crate::CircuitBreakerError::CircuitOpen`].
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback fired once per state transition, deferred to
    /// the next scheduling opportunity after the triggering call returns
    /// (never invoked reentrantly from within `execute`). Panics inside the
    /// callback are caught and logged.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitBreakerEvent::StateTransition {
                from_state,
                to_state,
                ..
            } = event
            {
                f(*from_state, *to_state);
            }
        }));
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<CircuitBreakerConfig<E>, ConfigError> {
        if !(0.0..=1.0).contains(&self.timeout_jitter) {
            return Err(ConfigError::out_of_range(
                "timeout_jitter",
                "between 0.0 and 1.0",
                self.timeout_jitter,
            ));
        }
        if self.half_open_max_requests == 0 {
            return Err(ConfigError::out_of_range(
                "half_open_max_requests",
                "at least 1",
                self.half_open_max_requests,
            ));
        }

        Ok(CircuitBreakerConfig {
            max_failures: self.max_failures,
            timeout: self.timeout,
            timeout_jitter: self.timeout_jitter,
            half_open_max_requests: self.half_open_max_requests,
            interval: self.interval,
            ready_to_trip: self.ready_to_trip,
            is_successful: self.is_successful,
            name: self.name,
            event_listeners: self.event_listeners,
        })
    }
}

impl<E> Default for CircuitBreakerConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for CircuitBreakerConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("max_failures", &self.max_failures)
            .field("timeout", &self.timeout)
            .field("timeout_jitter", &self.timeout_jitter)
            .field("half_open_max_requests", &self.half_open_max_requests)
            .field("interval", &self.interval)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config: CircuitBreakerConfig<String> = CircuitBreakerConfig::builder().build().unwrap();
        assert_eq!(config.max_failures, 5);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.timeout_jitter, 0.1);
        assert_eq!(config.half_open_max_requests, 1);
        assert!(config.interval.is_none());
    }

    #[test]
    fn jitter_out_of_range_is_rejected() {
        let err = CircuitBreakerConfig::<String>::builder()
            .timeout_jitter(1.5)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn zero_half_open_requests_is_rejected() {
        let err = CircuitBreakerConfig::<String>::builder()
            .half_open_max_requests(0)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn presets_set_expected_max_failures() {
        let sensitive: CircuitBreakerConfig<String> = CircuitBreakerConfig::sensitive().unwrap();
        assert_eq!(sensitive.max_failures, 3);
        let tolerant: CircuitBreakerConfig<String> = CircuitBreakerConfig::tolerant().unwrap();
        assert_eq!(tolerant.max_failures, 20);
    }

    #[test]
    fn default_ready_to_trip_uses_consecutive_failures() {
        let config: CircuitBreakerConfig<String> =
            CircuitBreakerConfig::builder().max_failures(3).build().unwrap();
        let mut counts = CircuitCounts::default();
        counts.consecutive_failures = 2;
        assert!(!config.ready_to_trip(&counts));
        counts.consecutive_failures = 3;
        assert!(config.ready_to_trip(&counts));
    }

    #[test]
    fn default_is_successful_treats_any_error_as_failure() {
        let config: CircuitBreakerConfig<String> = CircuitBreakerConfig::builder().build().unwrap();
        assert!(config.is_successful(None));
        assert!(!config.is_successful(Some(&"boom".to_string())));
    }
}
