//! Bounded-attempt retry driver with pluggable backoff, jitter, and
//! retryability classification.
//!
//! # Example
//!
//! ```
//! use resilience_retry::{Retry, RetryConfig};
//! use resilience_core::CancellationToken;
//!
//! #[derive(Debug, Clone)]
//! struct FlakyError;
//!
//! impl resilience_retry::Retryable for FlakyError {}
//!
//! # #[tokio::main]
//! # async fn main() {
//! let retry = Retry::new(RetryConfig::<FlakyError>::conservative().unwrap());
//!
//! let result = retry
//!     .execute(
//!         |_token| async move { Ok::<_, FlakyError>(42) },
//!         &CancellationToken::new(),
//!     )
//!     .await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
mod retry;

pub use backoff::{BackoffPolicy, Jitter};
pub use config::{RetryConfig, RetryConfigBuilder};
pub use error::RetryError;
pub use events::RetryEvent;
pub use retry::{Retry, Retryable};
