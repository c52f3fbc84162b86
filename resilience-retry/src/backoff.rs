//! Backoff delay computation and jitter.

use std::time::Duration;

use rand::Rng;

/// Absolute ceiling on any computed delay, regardless of policy or attempt
/// count. Prevents overflow when `multiplier^(attempt-1)` grows unbounded.
const MAX_DELAY: Duration = Duration::from_secs(3600);

/// How the base delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffPolicy {
    /// Every attempt waits the same `initial_delay`.
    Constant,
    /// Attempt `n` waits `initial_delay * n`.
    Linear,
    /// Attempt `n` waits `initial_delay * multiplier^(n-1)`.
    Exponential {
        /// Growth factor applied per attempt.
        multiplier: f64,
    },
}

/// How randomness is layered on top of the computed base delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// No jitter; use the base delay as-is.
    None,
    /// Uniform on `[0, base)`.
    Full,
    /// `base/2 + uniform[0, base/2)`, i.e. 50-100% of the base delay.
    Equal,
    /// `uniform[base, min(prev*3, base*10))`, carrying `prev` across
    /// iterations.
    Decorrelated,
}

/// Computes the unjittered base delay for `attempt` (1-indexed) under
/// `policy`, clamped to `max_delay` (if set) and the absolute one-hour
/// ceiling.
pub fn base_delay(
    policy: BackoffPolicy,
    initial_delay: Duration,
    attempt: u32,
    max_delay: Option<Duration>,
) -> Duration {
    let raw = match policy {
        BackoffPolicy::Constant => initial_delay,
        BackoffPolicy::Linear => initial_delay.saturating_mul(attempt),
        BackoffPolicy::Exponential { multiplier } => {
            let factor = multiplier.powi(attempt as i32 - 1);
            if !factor.is_finite() || factor < 0.0 {
                MAX_DELAY
            } else {
                initial_delay.mul_f64(factor)
            }
        }
    };

    let mut clamped = raw;
    if let Some(max) = max_delay {
        clamped = clamped.min(max);
    }
    clamped.min(MAX_DELAY)
}

/// Applies `jitter` to `base`, returning the delay to actually sleep plus
/// the `prev` value to carry into the next decorrelated-jitter call.
///
/// `prev` is only meaningful for [`Jitter::Decorrelated`]; callers not using
/// that mode may pass `base` and ignore the returned value.
pub fn apply_jitter(jitter: Jitter, base: Duration, prev: Duration) -> (Duration, Duration) {
    let mut rng = rand::thread_rng();
    match jitter {
        Jitter::None => (base, base),
        Jitter::Full => {
            let delay = if base.is_zero() {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(rng.gen_range(0.0..base.as_secs_f64()))
            };
            (delay, delay)
        }
        Jitter::Equal => {
            let half = base.mul_f64(0.5);
            let extra = if half.is_zero() {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(rng.gen_range(0.0..half.as_secs_f64()))
            };
            (half + extra, half + extra)
        }
        Jitter::Decorrelated => {
            let lower = base.as_secs_f64();
            let upper = (prev.as_secs_f64() * 3.0).max(lower).min(base.as_secs_f64() * 10.0);
            let upper = upper.max(lower);
            let delay = if upper <= lower {
                base
            } else {
                Duration::from_secs_f64(rng.gen_range(lower..=upper))
            };
            (delay, delay)
        }
    }
}
