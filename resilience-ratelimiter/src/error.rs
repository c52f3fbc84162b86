//! Error types for the rate limiter pattern.

use thiserror::Error;

/// How a [`crate::RateLimiter`] or its storage adapter failed.
#[derive(Debug, Clone, Error)]
pub enum RateLimiterError<E> {
    /// Admission was refused because the bucket for `key` has no tokens
    /// left.
    #[error("rate limit exceeded for key '{key}'")]
    RateLimitExceeded {
        /// The (possibly sanitized) key that was denied. May be empty.
        key: String,
    },

    /// The caller-supplied key exceeded `max_key_length`.
    #[error("key of length {key_length} exceeds max length {max_length} (preview: '{key_preview}')")]
    KeyTooLong {
        /// The length of the rejected key.
        key_length: usize,
        /// The configured maximum.
        max_length: usize,
        /// A truncated, PII-safe preview of the key (at most 20 chars + ellipsis).
        key_preview: String,
    },

    /// `take(key, n)` requested more tokens than `max_tokens_per_request`.
    #[error("requested {requested} tokens exceeds max {max} per request")]
    TokensExceeded {
        /// Tokens requested.
        requested: f64,
        /// Configured maximum.
        max: f64,
    },

    /// A storage operation did not complete within `storage_timeout`.
    #[error("storage operation '{operation}' timed out after {timeout_ms}ms")]
    StorageTimeout {
        /// The storage operation that timed out (e.g. "get", "set").
        operation: &'static str,
        /// The configured timeout, in milliseconds.
        timeout_ms: u64,
    },

    /// A storage adapter call failed for a reason other than a timeout.
    #[error("storage unavailable: {cause}")]
    StorageUnavailable {
        /// A description of the underlying failure.
        cause: String,
    },

    /// A bucket state read back from storage failed schema validation.
    #[error("invalid bucket state read back from storage for key '{key}'")]
    InvalidBucketState {
        /// The key whose stored state was invalid.
        key: String,
    },

    /// [`crate::RateLimiter::health_check`] failed.
    #[error("rate limiter health check failed: {cause}")]
    HealthCheck {
        /// A description of the failure.
        cause: String,
    },

    /// The caller's own cancellation token was tripped.
    #[error("operation was cancelled")]
    Cancelled,

    /// The wrapped operation (in [`crate::RateLimiter::execute`]) returned
    /// an error.
    #[error(transparent)]
    Inner(E),
}

impl<E> RateLimiterError<E> {
    /// Returns `true` if admission was refused by the bucket itself (as
    /// opposed to a key or storage error).
    pub fn is_rate_limit_exceeded(&self) -> bool {
        matches!(self, RateLimiterError::RateLimitExceeded { .. })
    }

    /// Returns the inner error, if this wraps one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RateLimiterError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Builds the length-limited, PII-safe key preview used in
/// [`RateLimiterError::KeyTooLong`]: at most 20 characters, followed by an
/// ellipsis if truncated.
pub fn key_preview(key: &str) -> String {
    const MAX_PREVIEW_CHARS: usize = 20;
    let mut preview: String = key.chars().take(MAX_PREVIEW_CHARS).collect();
    if key.chars().count() > MAX_PREVIEW_CHARS {
        preview.push('\u{2026}');
    }
    preview
}
