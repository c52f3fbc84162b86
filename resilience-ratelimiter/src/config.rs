//! Configuration for the rate limiter pattern.

use std::sync::Arc;
use std::time::Duration;

use resilience_core::{ConfigError, EventListeners, FnListener};

use crate::events::RateLimiterEvent;
use crate::storage::RateLimiterStorage;

/// What to do when a storage adapter call fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFailureMode {
    /// Admit the request despite the storage failure.
    FailOpen,
    /// Deny the request. `wait` retries with exponential backoff instead.
    FailClosed,
    /// Propagate the storage error to the caller unchanged.
    Throw,
}

/// Configuration for a [`crate::RateLimiter`].
#[derive(Clone)]
pub struct RateLimiterConfig {
    pub(crate) rate: f64,
    pub(crate) burst: f64,
    pub(crate) interval: Duration,
    pub(crate) max_buckets: usize,
    pub(crate) storage: Option<Arc<dyn RateLimiterStorage>>,
    pub(crate) storage_ttl: Option<Duration>,
    pub(crate) storage_failure_mode: StorageFailureMode,
    pub(crate) storage_timeout: Duration,
    pub(crate) sanitize_keys: bool,
    pub(crate) max_key_length: usize,
    pub(crate) max_tokens_per_request: f64,
    pub(crate) sanitization_cache_size: usize,
    pub(crate) cleanup_interval: Duration,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
}

impl RateLimiterConfig {
    /// Starts a new configuration builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Precomputed refill rate in tokens per millisecond.
    pub(crate) fn tokens_per_ms(&self) -> f64 {
        self.rate / self.interval.as_millis().max(1) as f64
    }

    /// Default storage TTL: `interval * (burst/rate) * 2`, capped at one
    /// week.
    pub(crate) fn default_storage_ttl(&self) -> Duration {
        let interval_ms = self.interval.as_millis() as f64;
        let ttl_ms = interval_ms * (self.burst / self.rate) * 2.0;
        let capped = ttl_ms.min(Duration::from_secs(7 * 24 * 3600).as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Rate limiter tuned for a per-second API budget: `rate` requests
    /// per second, burst equal to rate.
    pub fn per_second(rate: f64) -> Result<Self, ConfigError> {
        Self::builder()
            .rate(rate)
            .interval(Duration::from_secs(1))
            .build()
    }

    /// Rate limiter tuned for a per-minute budget: `rate` requests per
    /// minute, burst equal to rate.
    pub fn per_minute(rate: f64) -> Result<Self, ConfigError> {
        Self::builder()
            .rate(rate)
            .interval(Duration::from_secs(60))
            .build()
    }
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    rate: f64,
    burst: Option<f64>,
    interval: Duration,
    max_buckets: usize,
    storage: Option<Arc<dyn RateLimiterStorage>>,
    storage_ttl: Option<Duration>,
    storage_failure_mode: StorageFailureMode,
    storage_timeout: Duration,
    sanitize_keys: bool,
    max_key_length: usize,
    max_tokens_per_request: f64,
    sanitization_cache_size: usize,
    cleanup_interval: Duration,
    name: String,
    event_listeners: EventListeners<RateLimiterEvent>,
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            rate: 10.0,
            burst: None,
            interval: Duration::from_secs(1),
            max_buckets: 10_000,
            storage: None,
            storage_ttl: None,
            storage_failure_mode: StorageFailureMode::FailOpen,
            storage_timeout: Duration::from_millis(1000),
            sanitize_keys: true,
            max_key_length: 256,
            max_tokens_per_request: 1.0,
            sanitization_cache_size: 1024,
            cleanup_interval: Duration::from_secs(60),
            name: "rate_limiter".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the refill rate, in tokens per [`interval`](Self::interval).
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Sets the bucket's burst capacity. Defaults to `rate` if unset.
    pub fn burst(mut self, burst: f64) -> Self {
        self.burst = Some(burst);
        self
    }

    /// Sets the refill interval over which `rate` tokens accrue.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the maximum number of distinct keys tracked in the in-memory
    /// LRU map. `0` means unbounded.
    pub fn max_buckets(mut self, max: usize) -> Self {
        self.max_buckets = max;
        self
    }

    /// Configures an external storage adapter. When set, async operations
    /// route through it instead of the in-memory map.
    pub fn storage(mut self, storage: Arc<dyn RateLimiterStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the TTL applied to stored entries. Defaults to
    /// `interval * (burst/rate) * 2`, capped at one week.
    pub fn storage_ttl(mut self, ttl: Duration) -> Self {
        self.storage_ttl = Some(ttl);
        self
    }

    /// Sets how storage failures are handled.
    pub fn storage_failure_mode(mut self, mode: StorageFailureMode) -> Self {
        self.storage_failure_mode = mode;
        self
    }

    /// Sets the per-call storage timeout. Must be in `[100ms, 300s]`.
    pub fn storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Enables or disables key sanitization (default enabled).
    pub fn sanitize_keys(mut self, enabled: bool) -> Self {
        self.sanitize_keys = enabled;
        self
    }

    /// Sets the maximum accepted raw key length. Must be in `[1, 4096]`.
    pub fn max_key_length(mut self, max: usize) -> Self {
        self.max_key_length = max;
        self
    }

    /// Sets the maximum tokens a single `take` call may request.
    pub fn max_tokens_per_request(mut self, max: f64) -> Self {
        self.max_tokens_per_request = max;
        self
    }

    /// Sets the bound on the key-sanitization memoization cache. Must be
    /// at most `100000`.
    pub fn sanitization_cache_size(mut self, size: usize) -> Self {
        self.sanitization_cache_size = size;
        self
    }

    /// Sets how often the in-memory map is swept for buckets that have
    /// fully refilled and gone untouched since, evicting them so idle keys
    /// don't pin memory between LRU evictions. Must be greater than 0.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Sets the name used in events and logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked once per denied admission.
    pub fn on_deny<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Denied { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    /// Registers a callback invoked once per admitted request.
    pub fn on_allow<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Allowed { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    /// Registers a callback invoked once per storage-adapter failure, with
    /// the operation name and a description of the cause.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::StorageError { operation, cause, .. } = event {
                f(operation, cause);
            }
        }));
        self
    }

    /// Registers a callback invoked after every storage-adapter call with
    /// its latency. The limiter skips this instrumentation entirely (no
    /// timer, no event) when no listener is registered at all.
    pub fn on_storage_latency<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::StorageLatency { operation, duration, .. } = event {
                f(operation, *duration);
            }
        }));
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<RateLimiterConfig, ConfigError> {
        if self.rate <= 0.0 {
            return Err(ConfigError::out_of_range("rate", "greater than 0", self.rate));
        }
        let burst = self.burst.unwrap_or(self.rate);
        if burst <= 0.0 {
            return Err(ConfigError::out_of_range("burst", "greater than 0", burst));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::out_of_range(
                "interval",
                "greater than 0",
                format!("{:?}", self.interval),
            ));
        }
        if self.max_key_length == 0 || self.max_key_length > 4096 {
            return Err(ConfigError::out_of_range(
                "max_key_length",
                "between 1 and 4096",
                self.max_key_length,
            ));
        }
        if self.sanitization_cache_size > 100_000 {
            return Err(ConfigError::out_of_range(
                "sanitization_cache_size",
                "at most 100000",
                self.sanitization_cache_size,
            ));
        }
        if self.storage_timeout < Duration::from_millis(100)
            || self.storage_timeout > Duration::from_millis(300_000)
        {
            return Err(ConfigError::out_of_range(
                "storage_timeout",
                "between 100ms and 300000ms",
                format!("{:?}", self.storage_timeout),
            ));
        }
        if self.max_tokens_per_request <= 0.0 {
            return Err(ConfigError::out_of_range(
                "max_tokens_per_request",
                "greater than 0",
                self.max_tokens_per_request,
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::out_of_range(
                "cleanup_interval",
                "greater than 0",
                format!("{:?}", self.cleanup_interval),
            ));
        }

        Ok(RateLimiterConfig {
            rate: self.rate,
            burst,
            interval: self.interval,
            max_buckets: self.max_buckets,
            storage: self.storage,
            storage_ttl: self.storage_ttl,
            storage_failure_mode: self.storage_failure_mode,
            storage_timeout: self.storage_timeout,
            sanitize_keys: self.sanitize_keys,
            max_key_length: self.max_key_length,
            max_tokens_per_request: self.max_tokens_per_request,
            sanitization_cache_size: self.sanitization_cache_size,
            cleanup_interval: self.cleanup_interval,
            name: self.name,
            event_listeners: self.event_listeners,
        })
    }
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_successfully() {
        let config = RateLimiterConfig::builder().build().unwrap();
        assert_eq!(config.rate, 10.0);
        assert_eq!(config.burst, 10.0);
    }

    #[test]
    fn burst_defaults_to_rate() {
        let config = RateLimiterConfig::builder().rate(42.0).build().unwrap();
        assert_eq!(config.burst, 42.0);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(RateLimiterConfig::builder().rate(0.0).build().is_err());
    }

    #[test]
    fn key_length_out_of_range_is_rejected() {
        assert!(RateLimiterConfig::builder().max_key_length(0).build().is_err());
        assert!(RateLimiterConfig::builder().max_key_length(5000).build().is_err());
    }

    #[test]
    fn storage_timeout_out_of_range_is_rejected() {
        assert!(RateLimiterConfig::builder()
            .storage_timeout(Duration::from_millis(10))
            .build()
            .is_err());
        assert!(RateLimiterConfig::builder()
            .storage_timeout(Duration::from_secs(400))
            .build()
            .is_err());
    }

    #[test]
    fn zero_cleanup_interval_is_rejected() {
        assert!(RateLimiterConfig::builder()
            .cleanup_interval(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn presets_build_with_expected_shape() {
        let per_second = RateLimiterConfig::per_second(100.0).unwrap();
        assert_eq!(per_second.interval, Duration::from_secs(1));
        let per_minute = RateLimiterConfig::per_minute(600.0).unwrap();
        assert_eq!(per_minute.interval, Duration::from_secs(60));
    }

    #[test]
    fn default_storage_ttl_is_capped_at_one_week() {
        let config = RateLimiterConfig::builder()
            .rate(1.0)
            .burst(1_000_000.0)
            .interval(Duration::from_millis(1))
            .build()
            .unwrap();
        assert_eq!(config.default_storage_ttl(), Duration::from_secs(7 * 24 * 3600));
    }
}
