//! Token-bucket rate limiter with an optional pluggable external storage
//! adapter, key sanitization, and LRU key eviction.
//!
//! # Example
//!
//! ```
//! use resilience_ratelimiter::{RateLimiter, RateLimiterConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let limiter = RateLimiter::new(
//!     RateLimiterConfig::builder()
//!         .rate(10.0)
//!         .burst(10.0)
//!         .build()
//!         .unwrap(),
//! );
//! assert!(limiter.allow("caller-1").await.unwrap());
//! # }
//! ```

pub mod bucket;
pub mod config;
pub mod error;
mod key;
mod limiter;
pub mod events;
pub mod storage;

pub use bucket::{BucketState, TOKEN_EPSILON};
pub use config::{RateLimiterConfig, RateLimiterConfigBuilder, StorageFailureMode};
pub use error::RateLimiterError;
pub use events::RateLimiterEvent;
pub use limiter::{RateLimiter, RateLimiterOpError};
pub use storage::{CompareAndSetResult, RateLimiterStorage, StorageError};
