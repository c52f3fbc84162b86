//! Configuration for the retry driver.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use resilience_core::{ConfigError, EventListeners, FnListener};

use crate::backoff::{BackoffPolicy, Jitter};
use crate::events::RetryEvent;

type IsRetryable<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Configuration for a [`crate::Retry`].
pub struct RetryConfig<E> {
    pub(crate) max_attempts: u32,
    pub(crate) initial_delay: Duration,
    pub(crate) max_delay: Option<Duration>,
    pub(crate) backoff_policy: BackoffPolicy,
    pub(crate) jitter: Jitter,
    pub(crate) is_retryable: Option<IsRetryable<E>>,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl<E> RetryConfig<E> {
    /// Starts a new configuration builder with spec-default values.
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }

    /// Aggressive preset: exponential backoff with multiplier 2,
    /// `max_attempts = 5`.
    pub fn aggressive() -> Result<Self, ConfigError> {
        Self::builder()
            .max_attempts(5)
            .backoff_policy(BackoffPolicy::Exponential { multiplier: 2.0 })
            .build()
    }

    /// Conservative preset: linear backoff, `max_attempts = 3`.
    pub fn conservative() -> Result<Self, ConfigError> {
        Self::builder()
            .max_attempts(3)
            .backoff_policy(BackoffPolicy::Linear)
            .build()
    }

    pub(crate) fn classify_retryable(&self, explicit: Option<bool>, error: &E) -> bool {
        if let Some(retryable) = explicit {
            return retryable;
        }
        match &self.is_retryable {
            Some(f) => f(error),
            None => true,
        }
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder<E> {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Option<Duration>,
    backoff_policy: BackoffPolicy,
    jitter: Jitter,
    is_retryable: Option<IsRetryable<E>>,
    name: String,
    event_listeners: EventListeners<RetryEvent>,
}

impl<E> RetryConfigBuilder<E> {
    /// Creates a new builder with spec defaults: `max_attempts = 3`,
    /// `initial_delay = 100ms`, no `max_delay`, constant backoff, equal
    /// jitter.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: None,
            backoff_policy: BackoffPolicy::Constant,
            jitter: Jitter::Equal,
            is_retryable: None,
            name: "retry".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Maximum number of invocations of the operation, including the
    /// initial attempt. Must be at least 1.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Base delay before the first retry. Must be at least 1ms.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Caps the computed delay before jitter is applied. `None` leaves only
    /// the absolute one-hour ceiling in effect.
    pub fn max_delay(mut self, delay: Option<Duration>) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets how the base delay grows between attempts.
    pub fn backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.backoff_policy = policy;
        self
    }

    /// Sets the jitter mode applied on top of the base delay. Default
    /// [`Jitter::Equal`].
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Overrides retryability classification for errors that don't carry an
    /// explicit [`resilience_core::RetryableError`] flag. Default: treat
    /// every error as retryable.
    pub fn is_retryable<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Some(Arc::new(f));
        self
    }

    /// Sets the name used in events and logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback fired after a failed attempt, once the retry
    /// delay has been computed and before the driver sleeps. Panics inside
    /// the callback are caught and logged.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<RetryConfig<E>, ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::out_of_range(
                "max_attempts",
                "at least 1",
                self.max_attempts,
            ));
        }
        if self.initial_delay < Duration::from_millis(1) {
            return Err(ConfigError::out_of_range(
                "initial_delay",
                "at least 1ms",
                format!("{:?}", self.initial_delay),
            ));
        }
        if let BackoffPolicy::Exponential { multiplier } = self.backoff_policy {
            if !(multiplier >= 0.0) {
                return Err(ConfigError::out_of_range(
                    "multiplier",
                    "greater than or equal to 0",
                    multiplier,
                ));
            }
        }

        Ok(RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_policy: self.backoff_policy,
            jitter: self.jitter,
            is_retryable: self.is_retryable,
            name: self.name,
            event_listeners: self.event_listeners,
        })
    }
}

impl<E> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_policy", &self.backoff_policy)
            .field("jitter", &self.jitter)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config: RetryConfig<String> = RetryConfig::builder().build().unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.backoff_policy, BackoffPolicy::Constant);
        assert_eq!(config.jitter, Jitter::Equal);
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        let err = RetryConfig::<String>::builder().max_attempts(0).build();
        assert!(err.is_err());
    }

    #[test]
    fn sub_millisecond_initial_delay_is_rejected() {
        let err = RetryConfig::<String>::builder()
            .initial_delay(Duration::from_micros(500))
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn negative_multiplier_is_rejected() {
        let err = RetryConfig::<String>::builder()
            .backoff_policy(BackoffPolicy::Exponential { multiplier: -1.0 })
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn presets_set_expected_shape() {
        let aggressive: RetryConfig<String> = RetryConfig::aggressive().unwrap();
        assert_eq!(aggressive.max_attempts, 5);
        assert!(matches!(
            aggressive.backoff_policy,
            BackoffPolicy::Exponential { multiplier } if multiplier == 2.0
        ));

        let conservative: RetryConfig<String> = RetryConfig::conservative().unwrap();
        assert_eq!(conservative.max_attempts, 3);
        assert_eq!(conservative.backoff_policy, BackoffPolicy::Linear);
    }

    #[test]
    fn default_classification_treats_errors_as_retryable() {
        let config: RetryConfig<String> = RetryConfig::builder().build().unwrap();
        assert!(config.classify_retryable(None, &"boom".to_string()));
    }

    #[test]
    fn explicit_flag_overrides_predicate() {
        let config: RetryConfig<String> = RetryConfig::builder()
            .is_retryable(|_| true)
            .build()
            .unwrap();
        assert!(!config.classify_retryable(Some(false), &"boom".to_string()));
    }
}
