//! The rate limiter itself: keyed token buckets backed by an in-memory
//! LRU map, with an optional external storage adapter for the async path.

use std::convert::Infallible;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use lru::LruCache;
use rand::Rng;

use resilience_core::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::bucket::{self, BucketState};
use crate::config::{RateLimiterConfig, StorageFailureMode};
use crate::error::RateLimiterError;
use crate::events::RateLimiterEvent;
use crate::key::KeySanitizer;

/// The error type returned by every [`RateLimiter`] method except
/// [`RateLimiter::execute`], which has no wrapped-operation error to
/// report.
pub type RateLimiterOpError = RateLimiterError<Infallible>;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A token-bucket rate limiter, keyed by caller-supplied string keys.
pub struct RateLimiter {
    config: RateLimiterConfig,
    memory: Mutex<LruCache<String, BucketState>>,
    sanitizer: KeySanitizer,
    eviction_count: AtomicU64,
    expired_count: AtomicU64,
    last_cleanup_ms: AtomicI64,
}

impl RateLimiter {
    /// Creates a new rate limiter from `config`.
    pub fn new(config: RateLimiterConfig) -> Self {
        let memory = match NonZeroUsize::new(config.max_buckets) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        let sanitizer = KeySanitizer::new(
            config.max_key_length,
            config.sanitize_keys,
            config.sanitization_cache_size,
        );
        let last_cleanup_ms = now_ms();
        Self {
            config,
            memory: Mutex::new(memory),
            sanitizer,
            eviction_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            last_cleanup_ms: AtomicI64::new(last_cleanup_ms),
        }
    }

    /// Number of distinct keys currently tracked in the in-memory map.
    pub fn key_count(&self) -> usize {
        self.memory.lock().expect("rate limiter memory lock poisoned").len()
    }

    /// Cumulative count of LRU evictions from the in-memory map.
    pub fn eviction_count(&self) -> u64 {
        self.eviction_count.load(Ordering::Relaxed)
    }

    /// Cumulative count of entries removed by the idle-bucket cleanup sweep
    /// (distinct from LRU evictions triggered by `max_buckets`).
    pub fn expired_count(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }

    /// Sweeps the in-memory map for buckets that have fully refilled and
    /// gone untouched since, at most once per `cleanup_interval`. Runs
    /// inline on whichever caller's access happens to cross the interval
    /// boundary rather than on a background task, since the map is only
    /// ever touched under its own lock.
    fn maybe_cleanup(&self, now: i64) {
        let interval_ms = self.config.cleanup_interval.as_millis() as i64;
        let last = self.last_cleanup_ms.load(Ordering::Relaxed);
        if now - last < interval_ms {
            return;
        }
        if self
            .last_cleanup_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let tokens_per_ms = self.config.tokens_per_ms();
        let burst = self.config.burst;
        let mut memory = self.memory.lock().expect("rate limiter memory lock poisoned");
        let stale: Vec<String> = memory
            .iter()
            .filter(|(_, state)| {
                let elapsed = (now - state.last_refill).max(0) as f64;
                elapsed * tokens_per_ms >= burst
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            memory.pop(key);
        }
        self.expired_count.fetch_add(stale.len() as u64, Ordering::Relaxed);
    }

    fn validate_demand(&self, demand: f64) -> Result<(), RateLimiterOpError> {
        if demand > self.config.max_tokens_per_request {
            return Err(RateLimiterError::TokensExceeded {
                requested: demand,
                max: self.config.max_tokens_per_request,
            });
        }
        Ok(())
    }

    /// Memory-only admission check for one token. Does not consult the
    /// external storage adapter even if configured.
    pub fn allow_sync(&self, key: &str) -> Result<bool, RateLimiterOpError> {
        self.take_sync(key, 1.0)
    }

    /// Memory-only admission check for `n` tokens.
    pub fn take_sync(&self, key: &str, n: f64) -> Result<bool, RateLimiterOpError> {
        self.validate_demand(n)?;
        let sanitized = self.sanitizer.process::<Infallible>(key)?;
        let admitted = self.step_memory(&sanitized, n);
        self.emit_outcome(&sanitized, admitted);
        Ok(admitted)
    }

    fn step_memory(&self, key: &str, demand: f64) -> bool {
        let now = now_ms();
        self.maybe_cleanup(now);
        let mut memory = self.memory.lock().expect("rate limiter memory lock poisoned");
        let state = memory
            .get(key)
            .copied()
            .unwrap_or_else(|| BucketState::full(self.config.burst, now));
        let result = bucket::step(state, now, self.config.tokens_per_ms(), self.config.burst, demand);
        if let Some((evicted_key, _)) = memory.push(key.to_string(), result.next) {
            if evicted_key != key {
                self.eviction_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        result.admitted
    }

    fn emit_outcome(&self, key: &str, admitted: bool) {
        let event = if admitted {
            RateLimiterEvent::Allowed {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
                key: key.to_string(),
            }
        } else {
            RateLimiterEvent::Denied {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
                key: key.to_string(),
            }
        };
        self.config.event_listeners.emit(&event);
        #[cfg(feature = "metrics")]
        {
            let metric = if admitted {
                "rate_limiter_allowed_total"
            } else {
                "rate_limiter_denied_total"
            };
            counter!(metric, "rate_limiter" => self.config.name.clone()).increment(1);
        }
    }

    /// Admission check for one token, routing through the external
    /// storage adapter when configured, per `storage_failure_mode` on
    /// error.
    pub async fn allow(&self, key: &str) -> Result<bool, RateLimiterOpError> {
        self.take(key, 1.0).await
    }

    /// Admission check for `n` tokens, routing through the external
    /// storage adapter when configured.
    pub async fn take(&self, key: &str, n: f64) -> Result<bool, RateLimiterOpError> {
        match self.admit_raw(key, n).await {
            Ok(admitted) => Ok(admitted),
            Err(err) => self.apply_failure_mode(err),
        }
    }

    /// The admission check with storage errors surfaced rather than
    /// collapsed by `storage_failure_mode`, so callers that need to treat
    /// "denied" and "storage unavailable" differently (namely
    /// [`wait`](Self::wait)) can.
    async fn admit_raw(&self, key: &str, n: f64) -> Result<bool, RateLimiterOpError> {
        self.validate_demand(n)?;
        let sanitized = self.sanitizer.process::<Infallible>(key)?;

        let admitted = match &self.config.storage {
            None => self.step_memory(&sanitized, n),
            Some(storage) => self.step_storage(storage.as_ref(), &sanitized, n).await?,
        };
        self.emit_outcome(&sanitized, admitted);
        Ok(admitted)
    }

    async fn step_storage(
        &self,
        storage: &dyn crate::storage::RateLimiterStorage,
        key: &str,
        demand: f64,
    ) -> Result<bool, RateLimiterOpError> {
        if storage.supports_compare_and_set() {
            self.step_storage_cas(storage, key, demand).await
        } else {
            self.step_storage_rmw(storage, key, demand).await
        }
    }

    /// Read-modify-write path for adapters without an atomic
    /// `compare_and_set`. Carries the documented TOCTOU window between
    /// `get` and `set` (spec.md §4.5).
    async fn step_storage_rmw(
        &self,
        storage: &dyn crate::storage::RateLimiterStorage,
        key: &str,
        demand: f64,
    ) -> Result<bool, RateLimiterOpError> {
        let now = now_ms();
        let timeout = self.config.storage_timeout;

        let start = Instant::now();
        let stored = tokio::time::timeout(timeout, storage.get(key))
            .await
            .map_err(|_| RateLimiterError::StorageTimeout {
                operation: "get",
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| RateLimiterError::StorageUnavailable { cause: e.0 })?;
        self.emit_storage_latency("get", start.elapsed());

        let state = match stored {
            Some(state) if state.is_valid(self.config.burst, now) => state,
            Some(_) => BucketState::full(self.config.burst, now),
            None => BucketState::full(self.config.burst, now),
        };

        let result = bucket::step(state, now, self.config.tokens_per_ms(), self.config.burst, demand);

        let ttl = self.config.storage_ttl.unwrap_or_else(|| self.config.default_storage_ttl());
        let start = Instant::now();
        tokio::time::timeout(timeout, storage.set(key, result.next, Some(ttl)))
            .await
            .map_err(|_| RateLimiterError::StorageTimeout {
                operation: "set",
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| RateLimiterError::StorageUnavailable { cause: e.0 })?;
        self.emit_storage_latency("set", start.elapsed());

        Ok(result.admitted)
    }

    /// Atomic path for adapters that implement a genuine
    /// `compare_and_set`: retries the step against whatever value the
    /// adapter reports as current each time a write is lost to a
    /// concurrent writer, instead of ever blindly overwriting it.
    async fn step_storage_cas(
        &self,
        storage: &dyn crate::storage::RateLimiterStorage,
        key: &str,
        demand: f64,
    ) -> Result<bool, RateLimiterOpError> {
        const MAX_ATTEMPTS: u32 = 5;
        let timeout = self.config.storage_timeout;
        let ttl = self.config.storage_ttl.unwrap_or_else(|| self.config.default_storage_ttl());

        let now = now_ms();
        let start = Instant::now();
        let stored = tokio::time::timeout(timeout, storage.get(key))
            .await
            .map_err(|_| RateLimiterError::StorageTimeout {
                operation: "get",
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| RateLimiterError::StorageUnavailable { cause: e.0 })?;
        self.emit_storage_latency("get", start.elapsed());

        let mut expected = match stored {
            Some(state) if state.is_valid(self.config.burst, now) => state,
            Some(_) | None => BucketState::full(self.config.burst, now),
        };

        for _ in 0..MAX_ATTEMPTS {
            let now = now_ms();
            let result = bucket::step(expected, now, self.config.tokens_per_ms(), self.config.burst, demand);

            let start = Instant::now();
            let cas = tokio::time::timeout(
                timeout,
                storage.compare_and_set(key, expected, result.next, Some(ttl)),
            )
            .await
            .map_err(|_| RateLimiterError::StorageTimeout {
                operation: "compare_and_set",
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| RateLimiterError::StorageUnavailable { cause: e.0 })?;
            self.emit_storage_latency("compare_and_set", start.elapsed());

            if cas.success {
                return Ok(result.admitted);
            }

            expected = if cas.current.is_valid(self.config.burst, now) {
                cas.current
            } else {
                BucketState::full(self.config.burst, now)
            };
        }

        Err(RateLimiterError::StorageUnavailable {
            cause: format!("compare_and_set did not converge after {MAX_ATTEMPTS} attempts for key {key:?}"),
        })
    }

    fn emit_storage_latency(&self, operation: &'static str, duration: Duration) {
        if self.config.event_listeners.is_empty() {
            return;
        }
        self.config.event_listeners.emit(&RateLimiterEvent::StorageLatency {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            operation,
            duration,
        });
    }

    fn apply_failure_mode(&self, err: RateLimiterOpError) -> Result<bool, RateLimiterOpError> {
        self.config.event_listeners.emit(&RateLimiterEvent::StorageError {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            operation: "step",
            cause: err.to_string(),
        });
        match self.config.storage_failure_mode {
            StorageFailureMode::FailOpen => Ok(true),
            StorageFailureMode::FailClosed => Ok(false),
            StorageFailureMode::Throw => Err(err),
        }
    }

    /// Waits until one token is available for `key`, then consumes it.
    /// Fails early with the token's reason if `token` trips first.
    pub async fn wait(&self, key: &str, token: &CancellationToken) -> Result<(), RateLimiterOpError> {
        let mut backoff = Duration::from_millis(100);
        loop {
            if token.tripped() {
                return Err(RateLimiterOpError::Cancelled);
            }

            match self.admit_raw(key, 1.0).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    let wait_ms = {
                        let sanitized = self.sanitizer.process::<Infallible>(key)?;
                        let memory = self.memory.lock().expect("rate limiter memory lock poisoned");
                        let tokens = memory.peek(&sanitized).map(|s| s.tokens).unwrap_or(0.0);
                        bucket::wait_time_ms(tokens, self.config.tokens_per_ms())
                    };
                    resilience_core::sleep(Duration::from_millis(wait_ms.max(1) as u64), token)
                        .await
                        .map_err(|_| RateLimiterOpError::Cancelled)?;
                }
                // A storage error under fail-closed retries with its own
                // exponential backoff (spec.md §4.5) rather than the
                // token-bucket's computed wait time, since there may be no
                // bucket state to compute one from.
                Err(_) if self.config.storage_failure_mode == StorageFailureMode::FailClosed => {
                    let jitter = rand::thread_rng().gen_range(0.5..=1.0);
                    let sleep_for = backoff.mul_f64(jitter);
                    resilience_core::sleep(sleep_for, token)
                        .await
                        .map_err(|_| RateLimiterOpError::Cancelled)?;
                    backoff = (backoff * 2).min(Duration::from_millis(5000));
                }
                Err(err) if self.config.storage_failure_mode == StorageFailureMode::FailOpen => {
                    let _ = err;
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Derives a key via `key_func(ctx)` and admits accordingly. A `None`
    /// key skips rate limiting entirely and admits.
    pub async fn allow_with_context<C>(
        &self,
        ctx: &C,
        key_func: impl FnOnce(&C) -> Option<String>,
    ) -> Result<bool, RateLimiterOpError> {
        match key_func(ctx) {
            Some(key) => self.allow(&key).await,
            None => Ok(true),
        }
    }

    /// Runs `op` under the rate limiter's admission policy, bound to `key`.
    pub async fn execute<F, Fut, T, E>(
        &self,
        op: F,
        key: &str,
        token: CancellationToken,
    ) -> Result<T, RateLimiterError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if token.tripped() {
            return Err(RateLimiterError::Cancelled);
        }
        let admitted = self.allow(key).await.map_err(RateLimiterError::widen)?;
        if !admitted {
            return Err(RateLimiterError::RateLimitExceeded { key: key.to_string() });
        }
        op(token).await.map_err(RateLimiterError::Inner)
    }

    /// Evicts the entry for `key` from the in-memory map (and, if
    /// configured, from storage).
    pub async fn delete(&self, key: &str) -> Result<(), RateLimiterOpError> {
        let sanitized = self.sanitizer.process::<Infallible>(key)?;
        self.memory.lock().expect("rate limiter memory lock poisoned").pop(&sanitized);
        if let Some(storage) = &self.config.storage {
            storage
                .delete(&sanitized)
                .await
                .map_err(|e| RateLimiterError::StorageUnavailable { cause: e.0 })?;
        }
        Ok(())
    }

    /// Clears every tracked key from the in-memory map (and, if
    /// configured, from storage).
    pub async fn reset(&self) -> Result<(), RateLimiterOpError> {
        self.memory.lock().expect("rate limiter memory lock poisoned").clear();
        if let Some(storage) = &self.config.storage {
            storage
                .clear()
                .await
                .map_err(|e| RateLimiterError::StorageUnavailable { cause: e.0 })?;
        }
        Ok(())
    }

    /// Alias for [`reset`](Self::reset).
    pub async fn close(&self) -> Result<(), RateLimiterOpError> {
        self.reset().await
    }

    /// Writes, reads back, and deletes a random probe key through the
    /// storage adapter. Trivially succeeds when no adapter is configured.
    pub async fn health_check(&self) -> Result<(), RateLimiterOpError> {
        let Some(storage) = &self.config.storage else {
            return Ok(());
        };

        let probe_key = format!("__rate_limiter_health_check_{}", rand::thread_rng().gen::<u64>());
        let probe_state = BucketState::full(self.config.burst, now_ms());

        storage
            .set(&probe_key, probe_state, Some(Duration::from_secs(30)))
            .await
            .map_err(|e| RateLimiterError::HealthCheck { cause: e.0 })?;

        let read_back = storage
            .get(&probe_key)
            .await
            .map_err(|e| RateLimiterError::HealthCheck { cause: e.0 })?;

        let _ = storage.delete(&probe_key).await;

        match read_back {
            Some(state) if state == probe_state => Ok(()),
            Some(_) => Err(RateLimiterError::HealthCheck {
                cause: "probe round-trip mismatch".to_string(),
            }),
            None => Err(RateLimiterError::HealthCheck {
                cause: "probe key not found after write".to_string(),
            }),
        }
    }
}

impl RateLimiterError<Infallible> {
    /// Widens an error that can never carry an `Inner` payload to any `E`.
    fn widen<E>(self) -> RateLimiterError<E> {
        match self {
            RateLimiterError::RateLimitExceeded { key } => RateLimiterError::RateLimitExceeded { key },
            RateLimiterError::KeyTooLong {
                key_length,
                max_length,
                key_preview,
            } => RateLimiterError::KeyTooLong {
                key_length,
                max_length,
                key_preview,
            },
            RateLimiterError::TokensExceeded { requested, max } => {
                RateLimiterError::TokensExceeded { requested, max }
            }
            RateLimiterError::StorageTimeout { operation, timeout_ms } => {
                RateLimiterError::StorageTimeout { operation, timeout_ms }
            }
            RateLimiterError::StorageUnavailable { cause } => RateLimiterError::StorageUnavailable { cause },
            RateLimiterError::InvalidBucketState { key } => RateLimiterError::InvalidBucketState { key },
            RateLimiterError::HealthCheck { cause } => RateLimiterError::HealthCheck { cause },
            RateLimiterError::Cancelled => RateLimiterError::Cancelled,
            RateLimiterError::Inner(never) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimiterConfig;
    use crate::storage::test_support::InMemoryStorage;
    use std::sync::Arc;

    #[test]
    fn drains_then_denies_then_refills() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(10.0)
                .burst(10.0)
                .interval(Duration::from_secs(1))
                .build()
                .unwrap(),
        );
        for _ in 0..10 {
            assert!(limiter.allow_sync("k").unwrap());
        }
        assert!(!limiter.allow_sync("k").unwrap());
    }

    #[test]
    fn per_key_isolation() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(1.0)
                .burst(1.0)
                .interval(Duration::from_secs(1))
                .build()
                .unwrap(),
        );
        assert!(limiter.allow_sync("a").unwrap());
        assert!(!limiter.allow_sync("a").unwrap());
        assert!(limiter.allow_sync("b").unwrap());
    }

    #[test]
    fn lru_eviction_scenario() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(1.0)
                .burst(1.0)
                .interval(Duration::from_secs(1))
                .max_buckets(3)
                .build()
                .unwrap(),
        );
        limiter.allow_sync("A").unwrap();
        limiter.allow_sync("B").unwrap();
        limiter.allow_sync("C").unwrap();
        limiter.allow_sync("A").unwrap(); // recency bump
        limiter.allow_sync("D").unwrap(); // evicts B

        assert_eq!(limiter.eviction_count(), 1);
        assert_eq!(limiter.key_count(), 3);
    }

    #[test]
    fn idle_bucket_cleanup_sweeps_fully_refilled_entries() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(1.0)
                .burst(1.0)
                .interval(Duration::from_secs(1))
                .cleanup_interval(Duration::from_millis(1))
                .build()
                .unwrap(),
        );
        limiter.allow_sync("k").unwrap();
        assert_eq!(limiter.key_count(), 1);

        // Force the interval boundary and give the bucket time to refill
        // fully so the sweep considers it stale.
        limiter.last_cleanup_ms.store(0, Ordering::SeqCst);
        let far_future = now_ms() + 10_000;
        limiter.maybe_cleanup(far_future);

        assert_eq!(limiter.key_count(), 0);
        assert_eq!(limiter.expired_count(), 1);
    }

    #[test]
    fn take_n_respects_max_tokens_per_request() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(10.0)
                .burst(10.0)
                .max_tokens_per_request(5.0)
                .build()
                .unwrap(),
        );
        let err = limiter.take_sync("k", 6.0).unwrap_err();
        assert!(matches!(err, RateLimiterError::TokensExceeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellable_wait_fails_on_token_trip() {
        let limiter = Arc::new(RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(1.0)
                .burst(1.0)
                .interval(Duration::from_secs(1))
                .build()
                .unwrap(),
        ));
        limiter.allow_sync("k").unwrap();

        let token = CancellationToken::new();
        let trip_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trip_token.trip("deadline");
        });

        let result = limiter.wait("k", &token).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn storage_backed_take_round_trips() {
        let storage = Arc::new(InMemoryStorage::new());
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(1.0)
                .burst(1.0)
                .interval(Duration::from_secs(1))
                .storage(storage)
                .build()
                .unwrap(),
        );
        assert!(limiter.allow("k").await.unwrap());
        assert!(!limiter.allow("k").await.unwrap());
    }

    #[tokio::test]
    async fn storage_fail_open_admits_on_error() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.fail_next.store(true, Ordering::SeqCst);
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(1.0)
                .burst(1.0)
                .storage(storage)
                .storage_failure_mode(StorageFailureMode::FailOpen)
                .build()
                .unwrap(),
        );
        assert!(limiter.allow("k").await.unwrap());
    }

    #[tokio::test]
    async fn storage_throw_propagates_error() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.fail_next.store(true, Ordering::SeqCst);
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(1.0)
                .burst(1.0)
                .storage(storage)
                .storage_failure_mode(StorageFailureMode::Throw)
                .build()
                .unwrap(),
        );
        assert!(limiter.allow("k").await.is_err());
    }

    #[tokio::test]
    async fn health_check_passes_with_working_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        let limiter = RateLimiter::new(RateLimiterConfig::builder().storage(storage).build().unwrap());
        assert!(limiter.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn health_check_trivially_passes_without_storage() {
        let limiter = RateLimiter::new(RateLimiterConfig::builder().build().unwrap());
        assert!(limiter.health_check().await.is_ok());
    }

    /// A storage adapter that loses its first `compare_and_set` race (as if
    /// a concurrent writer won) before behaving like a normal atomic store.
    struct OnceRacyStorage {
        state: Mutex<Option<BucketState>>,
        steal_once: std::sync::atomic::AtomicBool,
    }

    impl OnceRacyStorage {
        fn new() -> Self {
            Self {
                state: Mutex::new(None),
                steal_once: std::sync::atomic::AtomicBool::new(true),
            }
        }
    }

    #[async_trait::async_trait]
    impl crate::storage::RateLimiterStorage for OnceRacyStorage {
        async fn get(&self, _key: &str) -> Result<Option<BucketState>, crate::storage::StorageError> {
            Ok(*self.state.lock().unwrap())
        }

        async fn set(
            &self,
            _key: &str,
            state: BucketState,
            _ttl: Option<Duration>,
        ) -> Result<(), crate::storage::StorageError> {
            *self.state.lock().unwrap() = Some(state);
            Ok(())
        }

        async fn compare_and_set(
            &self,
            _key: &str,
            expected: BucketState,
            new: BucketState,
            _ttl: Option<Duration>,
        ) -> Result<crate::storage::CompareAndSetResult, crate::storage::StorageError> {
            if self.steal_once.swap(false, Ordering::SeqCst) {
                let stolen = BucketState {
                    tokens: expected.tokens - 1.0,
                    last_refill: expected.last_refill,
                };
                *self.state.lock().unwrap() = Some(stolen);
                return Ok(crate::storage::CompareAndSetResult {
                    success: false,
                    current: stolen,
                });
            }
            let mut state = self.state.lock().unwrap();
            let current = *state;
            let matches = current.is_none() || current == Some(expected);
            if matches {
                *state = Some(new);
                Ok(crate::storage::CompareAndSetResult {
                    success: true,
                    current: new,
                })
            } else {
                Ok(crate::storage::CompareAndSetResult {
                    success: false,
                    current: current.expect("non-matching compare_and_set implies a stored value"),
                })
            }
        }

        fn supports_compare_and_set(&self) -> bool {
            true
        }

        async fn delete(&self, _key: &str) -> Result<(), crate::storage::StorageError> {
            *self.state.lock().unwrap() = None;
            Ok(())
        }

        async fn clear(&self) -> Result<(), crate::storage::StorageError> {
            *self.state.lock().unwrap() = None;
            Ok(())
        }
    }

    #[tokio::test]
    async fn storage_cas_retries_after_a_lost_race_then_succeeds() {
        let storage = Arc::new(OnceRacyStorage::new());
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(10.0)
                .burst(10.0)
                .interval(Duration::from_secs(1))
                .storage(storage)
                .build()
                .unwrap(),
        );

        assert!(limiter.allow("k").await.unwrap());
    }

    #[tokio::test]
    async fn storage_backed_take_uses_compare_and_set_when_supported() {
        let storage = Arc::new(InMemoryStorage::new());
        assert!(storage.supports_compare_and_set());
        let limiter = RateLimiter::new(
            RateLimiterConfig::builder()
                .rate(1.0)
                .burst(1.0)
                .interval(Duration::from_secs(1))
                .storage(storage)
                .build()
                .unwrap(),
        );
        assert!(limiter.allow("k").await.unwrap());
        assert!(!limiter.allow("k").await.unwrap());
    }
}
