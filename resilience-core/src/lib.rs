//! Core infrastructure shared by the resilience crate family.
//!
//! This crate provides the substrate every pattern crate (bulkhead, circuit
//! breaker, rate limiter, retry) builds on:
//! - [`CancellationToken`] and cancellable [`sleep`] for cooperative cancellation
//! - [`Semaphore`], a FIFO-fair async semaphore with cancel-safe waiters
//! - An event system for observability ([`events`])
//! - A unified error type for composing multiple patterns ([`ResilienceError`])
//! - [`ConfigError`] for builder validation failures
//! - A thin logging seam ([`logging`]) for callers who want a non-`tracing` sink

pub mod cancellation;
pub mod error;
pub mod events;
pub mod logging;
pub mod semaphore;

pub use cancellation::{sleep, CancellationToken};
pub use error::{ConfigError, ResilienceError, RetryableError};
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
pub use logging::{NoopLogger, ResilienceLogger, TracingLogger};
pub use semaphore::{AcquireError, Semaphore};
