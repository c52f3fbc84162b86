//! Pure token-bucket math, independent of storage and keying concerns.
//!
//! Kept free of any `Instant`/async dependency so the refill step is
//! exactly reproducible in tests: callers pass millisecond timestamps, not
//! `Instant`s.

/// Tolerance absorbing floating-point drift in the admission check and
/// `take(n)` accounting.
pub const TOKEN_EPSILON: f64 = 1e-9;

/// Caps how much elapsed time a single refill step catches up on, so a
/// bucket that hasn't been touched in a long time (e.g. after the process
/// slept) doesn't instantly grant hours of accrued tokens beyond `burst`
/// anyway -- this mostly bounds the multiplication, not the result.
pub const MAX_ELAPSED_MS: i64 = 60 * 60 * 1000;

/// Ceiling on the reported wait time for a single token.
pub const MAX_WAIT_MS: i64 = 24 * 60 * 60 * 1000;

/// The token-bucket state for a single rate-limit key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    /// Tokens currently available, always in `[0, burst]` after a refill.
    pub tokens: f64,
    /// Milliseconds since epoch at which `tokens` was last refilled.
    pub last_refill: i64,
}

impl BucketState {
    /// A freshly initialized bucket: full, refilled at `now`.
    pub fn full(burst: f64, now: i64) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
        }
    }

    /// Returns `true` if this state is schema-valid and not absurd: tokens
    /// in `[0, 1e9]`, not exceeding `burst` (beyond float slop), and
    /// `last_refill` not unreasonably far in the future relative to `now`.
    pub fn is_valid(&self, burst: f64, now: i64) -> bool {
        if !self.tokens.is_finite() || self.tokens < 0.0 || self.tokens > 1e9 {
            return false;
        }
        if self.tokens > burst + TOKEN_EPSILON {
            return false;
        }
        if self.last_refill > now + 5_000 {
            return false;
        }
        true
    }
}

/// Outcome of a single [`step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    /// Whether `demand` tokens were available and consumed.
    pub admitted: bool,
    /// The state to write back, whether or not admission succeeded.
    pub next: BucketState,
}

/// Applies one refill-and-consume step to `state` at `now` (ms since
/// epoch) for `demand` tokens, at a continuous refill rate of
/// `tokens_per_ms` up to `burst`.
pub fn step(state: BucketState, now: i64, tokens_per_ms: f64, burst: f64, demand: f64) -> StepResult {
    let (refilled_tokens, last_refill) = if now < state.last_refill {
        // Backward clock jump: don't grant tokens for negative elapsed time.
        (state.tokens, now)
    } else {
        let elapsed = (now - state.last_refill).min(MAX_ELAPSED_MS) as f64;
        let tokens = (state.tokens + elapsed * tokens_per_ms).min(burst);
        (tokens, now)
    };

    let admitted = refilled_tokens >= demand - TOKEN_EPSILON;
    let final_tokens = if admitted {
        (refilled_tokens - demand).max(0.0)
    } else {
        refilled_tokens
    };

    StepResult {
        admitted,
        next: BucketState {
            tokens: final_tokens,
            last_refill,
        },
    }
}

/// Milliseconds to wait until one token is available, given a bucket
/// already refilled to `tokens_after_refill`. Capped at [`MAX_WAIT_MS`].
pub fn wait_time_ms(tokens_after_refill: f64, tokens_per_ms: f64) -> i64 {
    if tokens_after_refill >= 1.0 - TOKEN_EPSILON || tokens_per_ms <= 0.0 {
        return 0;
    }
    let ms = ((1.0 - tokens_after_refill) / tokens_per_ms).ceil() as i64;
    ms.min(MAX_WAIT_MS).max(0)
}
