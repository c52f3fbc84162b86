//! The external storage adapter contract for keeping bucket state outside
//! the process (e.g. Redis), plus the in-process LRU fallback.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::bucket::BucketState;

/// An error returned by a [`RateLimiterStorage`] implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StorageError(pub String);

impl StorageError {
    /// Wraps any displayable cause.
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self(cause.to_string())
    }
}

/// The outcome of a [`RateLimiterStorage::compare_and_set`] call.
#[derive(Debug, Clone, Copy)]
pub struct CompareAndSetResult {
    /// Whether the write was applied.
    pub success: bool,
    /// The state now stored, whether or not the write succeeded.
    pub current: BucketState,
}

/// A caller-supplied adapter for persisting bucket state outside the
/// process.
///
/// `compare_and_set` is optional: implementations that can't offer an
/// atomic conditional write fall back to the default, which always
/// reports failure, pushing the rate limiter onto its read-modify-write
/// path (accepted as a documented TOCTOU window, see spec.md §4.5).
///
/// Every method is expected to respect the caller's `storage_timeout`;
/// the rate limiter itself enforces the bound with `tokio::time::timeout`
/// around each call, so implementations don't need to self-impose one.
#[async_trait]
pub trait RateLimiterStorage: Send + Sync {
    /// Reads the bucket state stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<BucketState>, StorageError>;

    /// Writes `state` under `key` with an optional TTL.
    async fn set(&self, key: &str, state: BucketState, ttl: Option<Duration>) -> Result<(), StorageError>;

    /// Atomically writes `new` under `key` iff the currently stored value
    /// equals `expected`. Returns the post-write value either way.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: BucketState,
        new: BucketState,
        ttl: Option<Duration>,
    ) -> Result<CompareAndSetResult, StorageError> {
        let _ = (key, expected, new, ttl);
        Ok(CompareAndSetResult {
            success: false,
            current: new,
        })
    }

    /// Removes the entry stored under `key`, if present.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Removes every entry this adapter manages.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Returns `true` if this adapter implements a genuinely atomic
    /// [`compare_and_set`](Self::compare_and_set). Used only to decide
    /// whether to document the TOCTOU window in diagnostics; does not
    /// change behavior.
    fn supports_compare_and_set(&self) -> bool {
        false
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::InMemoryStorage;
    use super::*;

    struct NoCasStorage;

    #[async_trait]
    impl RateLimiterStorage for NoCasStorage {
        async fn get(&self, _key: &str) -> Result<Option<BucketState>, StorageError> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _state: BucketState, _ttl: Option<Duration>) -> Result<(), StorageError> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
        async fn clear(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_compare_and_set_always_reports_failure() {
        let storage = NoCasStorage;
        assert!(!storage.supports_compare_and_set());
        let state = BucketState::full(1.0, 0);
        let result = storage.compare_and_set("k", state, state, None).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn in_memory_compare_and_set_succeeds_on_first_write_to_an_absent_key() {
        let storage = InMemoryStorage::new();
        assert!(storage.supports_compare_and_set());
        let expected = BucketState::full(5.0, 0);
        let new = BucketState { tokens: 4.0, last_refill: 0 };
        let result = storage.compare_and_set("k", expected, new, None).await.unwrap();
        assert!(result.success);
        assert_eq!(storage.get("k").await.unwrap(), Some(new));
    }

    #[tokio::test]
    async fn in_memory_compare_and_set_fails_against_a_stale_expected_value() {
        let storage = InMemoryStorage::new();
        let first = BucketState::full(5.0, 0);
        let second = BucketState { tokens: 4.0, last_refill: 0 };
        storage.compare_and_set("k", first, second, None).await.unwrap();

        let stale = first;
        let attempted = BucketState { tokens: 3.0, last_refill: 0 };
        let result = storage.compare_and_set("k", stale, attempted, None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.current, second);
    }
}
