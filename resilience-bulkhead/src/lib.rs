//! Bulkhead pattern: caps concurrent executions of an async operation,
//! with an optional bounded FIFO admission queue and per-waiter timeout.
//!
//! # Example
//!
//! ```
//! use resilience_bulkhead::{Bulkhead, BulkheadConfig};
//! use resilience_core::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bulkhead = Bulkhead::new(
//!     BulkheadConfig::builder()
//!         .max_concurrent(10)
//!         .name("my-bulkhead")
//!         .build()
//!         .unwrap(),
//! );
//!
//! let result = bulkhead
//!     .execute(|_token| async move { Ok::<_, ()>(42) }, CancellationToken::new())
//!     .await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

mod bulkhead;
pub mod config;
pub mod error;
pub mod events;

pub use bulkhead::Bulkhead;
pub use config::{BulkheadConfig, BulkheadConfigBuilder};
pub use error::BulkheadError;
pub use events::BulkheadEvent;
