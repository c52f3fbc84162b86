//! Key length enforcement and sanitization, with a memoizing LRU cache.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::error::{key_preview, RateLimiterError};

const MAX_SANITIZED_LEN: usize = 256;

/// Truncates to 256 bytes (on a UTF-8 char boundary), strips control
/// characters (`0x00..=0x1F`, `0x7F`), and replaces path separators (`/`,
/// `\`) with `_`.
fn sanitize(key: &str) -> String {
    let boundary = (0..=key.len().min(MAX_SANITIZED_LEN))
        .rev()
        .find(|i| key.is_char_boundary(*i))
        .unwrap_or(0);
    key[..boundary]
        .chars()
        .filter(|c| !(*c <= '\u{1F}' || *c == '\u{7F}'))
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

/// Validates a caller-supplied key against `max_key_length` and, if
/// `sanitize_keys` is set, rewrites it through [`sanitize`], memoizing the
/// result in a bounded LRU cache so repeated keys don't re-run the
/// character-by-character pass.
pub struct KeySanitizer {
    max_key_length: usize,
    sanitize_keys: bool,
    cache: Option<Mutex<LruCache<String, String>>>,
}

impl KeySanitizer {
    /// Creates a sanitizer. `cache_size == 0` disables memoization (every
    /// call re-sanitizes).
    pub fn new(max_key_length: usize, sanitize_keys: bool, cache_size: usize) -> Self {
        let cache = NonZeroUsize::new(cache_size).map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            max_key_length,
            sanitize_keys,
            cache,
        }
    }

    /// Validates and, if configured, sanitizes `key`.
    pub fn process<E>(&self, key: &str) -> Result<String, RateLimiterError<E>> {
        let key_length = key.chars().count();
        if key_length > self.max_key_length {
            return Err(RateLimiterError::KeyTooLong {
                key_length,
                max_length: self.max_key_length,
                key_preview: key_preview(key),
            });
        }

        if !self.sanitize_keys {
            return Ok(key.to_string());
        }

        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().expect("sanitization cache lock poisoned");
            if let Some(hit) = cache.get(key) {
                return Ok(hit.clone());
            }
            let sanitized = sanitize(key);
            cache.put(key.to_string(), sanitized.clone());
            Ok(sanitized)
        } else {
            Ok(sanitize(key))
        }
    }
}
