//! Circuit breaker: a three-state fault detector around an async
//! operation, with half-open admission control and jittered recovery.
//!
//! # Example
//!
//! ```
//! use resilience_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig};
//! use resilience_core::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::builder()
//!         .max_failures(5)
//!         .name("upstream")
//!         .build()
//!         .unwrap(),
//! );
//!
//! let result = breaker
//!     .execute(|_token| async move { Ok::<_, std::io::Error>(42) }, CancellationToken::new())
//!     .await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

mod circuit;
pub mod config;
pub mod error;
pub mod events;

pub use circuit::{CircuitBreaker, CircuitCounts, CircuitState};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
