//! Configuration for the bulkhead pattern.

use std::time::Duration;

use resilience_core::{ConfigError, EventListeners, FnListener};

use crate::events::BulkheadEvent;

/// Configuration for a [`crate::Bulkhead`].
#[derive(Clone)]
pub struct BulkheadConfig {
    pub(crate) max_concurrent: usize,
    pub(crate) max_queue: usize,
    pub(crate) queue_timeout: Option<Duration>,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<BulkheadEvent>,
}

impl BulkheadConfig {
    /// Starts a new configuration builder.
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }

    /// Bulkhead tuned for a small worker pool: 16 concurrent, no queue.
    pub fn small() -> Result<Self, ConfigError> {
        Self::builder().max_concurrent(16).max_queue(0).build()
    }

    /// Bulkhead tuned for a mid-size service: 64 concurrent, queue of 64.
    pub fn medium() -> Result<Self, ConfigError> {
        Self::builder().max_concurrent(64).max_queue(64).build()
    }

    /// Bulkhead tuned for a large fleet: 256 concurrent, queue of 256.
    pub fn large() -> Result<Self, ConfigError> {
        Self::builder().max_concurrent(256).max_queue(256).build()
    }
}

/// Builder for [`BulkheadConfig`].
pub struct BulkheadConfigBuilder {
    max_concurrent: usize,
    max_queue: usize,
    queue_timeout: Option<Duration>,
    name: String,
    event_listeners: EventListeners<BulkheadEvent>,
}

impl BulkheadConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_concurrent: 25,
            max_queue: 0,
            queue_timeout: None,
            name: "bulkhead".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the maximum number of concurrent executions. Must be in
    /// `1..=10000`.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the maximum number of callers allowed to queue once execution
    /// capacity is exhausted. `0` disables queueing: a full bulkhead
    /// rejects immediately. Must be at most `100000`.
    pub fn max_queue(mut self, max: usize) -> Self {
        self.max_queue = max;
        self
    }

    /// Sets how long a queued caller waits for an execution permit before
    /// failing with [`crate::BulkheadError::QueueTimeout`]. `None` waits
    /// indefinitely. Must be at most one hour.
    pub fn queue_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.queue_timeout = timeout;
        self
    }

    /// Sets the name used in events and logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked once per rejected admission (never on
    /// a successful acquire). Panics inside the callback are caught.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let BulkheadEvent::CallRejected {
                active_count,
                queued_count,
                ..
            } = event
            {
                f(*active_count, *queued_count);
            }
        }));
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<BulkheadConfig, ConfigError> {
        if self.max_concurrent == 0 || self.max_concurrent > 10_000 {
            return Err(ConfigError::out_of_range(
                "max_concurrent",
                "between 1 and 10000",
                self.max_concurrent,
            ));
        }
        if self.max_queue > 100_000 {
            return Err(ConfigError::out_of_range(
                "max_queue",
                "at most 100000",
                self.max_queue,
            ));
        }
        if let Some(timeout) = self.queue_timeout {
            if timeout > Duration::from_secs(3600) {
                return Err(ConfigError::out_of_range(
                    "queue_timeout",
                    "at most 1 hour",
                    format!("{timeout:?}"),
                ));
            }
        }

        Ok(BulkheadConfig {
            max_concurrent: self.max_concurrent,
            max_queue: self.max_queue,
            queue_timeout: self.queue_timeout,
            name: self.name,
            event_listeners: self.event_listeners,
        })
    }
}

impl Default for BulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
