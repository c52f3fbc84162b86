//! Composable async resilience primitives: bulkhead, circuit breaker, rate
//! limiter, and retry, built on a shared cancellation/event/error substrate.
//!
//! Each pattern is available as both an individual crate and as a feature
//! of this meta-crate; all four are enabled by default.
//!
//! ```toml
//! [dependencies]
//! resilience = { version = "0.1", features = ["circuitbreaker", "bulkhead"] }
//! ```
//!
//! # Combining primitives
//!
//! The primitives compose by nesting `execute` calls, each layer passing
//! its own derived cancellation token to the next:
//!
//! ```
//! # #[cfg(all(feature = "bulkhead", feature = "circuitbreaker"))]
//! # {
//! use resilience::bulkhead::{Bulkhead, BulkheadConfig};
//! use resilience::circuitbreaker::{CircuitBreaker, CircuitBreakerConfig};
//! use resilience::core::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bulkhead = Bulkhead::new(BulkheadConfig::small().unwrap());
//! let breaker = CircuitBreaker::<std::io::Error>::new(
//!     CircuitBreakerConfig::default_preset().unwrap(),
//! );
//!
//! let token = CancellationToken::new();
//! let result = bulkhead
//!     .execute(
//!         |inner_token| {
//!             let breaker = breaker.clone();
//!             async move { breaker.execute(|_t| async { Ok::<_, std::io::Error>(7) }, inner_token).await }
//!         },
//!         token,
//!     )
//!     .await;
//! assert!(result.is_ok());
//! # }
//! # }
//! ```

pub use resilience_core as core;

#[cfg(feature = "bulkhead")]
pub use resilience_bulkhead as bulkhead;

#[cfg(feature = "circuitbreaker")]
pub use resilience_circuitbreaker as circuitbreaker;

#[cfg(feature = "ratelimiter")]
pub use resilience_ratelimiter as ratelimiter;

#[cfg(feature = "retry")]
pub use resilience_retry as retry;
