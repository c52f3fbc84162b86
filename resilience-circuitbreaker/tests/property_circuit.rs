//! Property tests for the circuit breaker state machine.
//!
//! Invariants tested:
//! - The breaker never admits more calls than it dispatched to the
//!   underlying operation (rejections never reach the operation)
//! - It trips to OPEN no later than `max_failures` consecutive failures
//! - While OPEN and before the timeout elapses, every call is rejected
//!   without ever invoking the operation

use proptest::prelude::*;
use resilience_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use resilience_core::CancellationToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
struct TestError;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: consecutive failures trip the breaker no later than
    /// `max_failures`, and every call dispatched to the operation is
    /// counted (no call is double-counted or lost).
    #[test]
    fn trips_no_later_than_max_consecutive_failures(
        max_failures in 1u32..=10,
        num_calls in 1usize..=30,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dispatched = Arc::new(AtomicUsize::new(0));
            let breaker = CircuitBreaker::<TestError>::new(
                CircuitBreakerConfig::builder()
                    .max_failures(max_failures)
                    .timeout(Duration::from_secs(3600))
                    .build()
                    .unwrap(),
            );

            for _ in 0..num_calls {
                let dispatched = Arc::clone(&dispatched);
                let _ = breaker
                    .execute(
                        move |_t| {
                            dispatched.fetch_add(1, Ordering::SeqCst);
                            async { Err::<(), _>(TestError) }
                        },
                        CancellationToken::new(),
                    )
                    .await;
            }

            let calls_made = dispatched.load(Ordering::SeqCst);
            prop_assert!(
                calls_made <= num_calls,
                "dispatched {} but only {} execute() calls were made",
                calls_made,
                num_calls
            );
            if num_calls as u32 >= max_failures {
                prop_assert_eq!(breaker.state(), CircuitState::Open);
                prop_assert!(
                    calls_made <= max_failures as usize,
                    "breaker dispatched {} calls to a failing operation but max_failures was {}",
                    calls_made,
                    max_failures
                );
            }
            Ok(())
        })?;
    }

    /// Property: once OPEN, calls made before the timeout elapses are
    /// rejected without reaching the operation at all.
    #[test]
    fn open_breaker_never_dispatches_before_timeout(
        max_failures in 1u32..=5,
        num_calls_after_open in 1usize..=20,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breaker = CircuitBreaker::<TestError>::new(
                CircuitBreakerConfig::builder()
                    .max_failures(max_failures)
                    .timeout(Duration::from_secs(3600))
                    .build()
                    .unwrap(),
            );

            for _ in 0..max_failures {
                let _ = breaker
                    .execute(|_t| async { Err::<(), _>(TestError) }, CancellationToken::new())
                    .await;
            }
            prop_assert_eq!(breaker.state(), CircuitState::Open);

            let dispatched = Arc::new(AtomicUsize::new(0));
            for _ in 0..num_calls_after_open {
                let dispatched = Arc::clone(&dispatched);
                let result = breaker
                    .execute(
                        move |_t| {
                            dispatched.fetch_add(1, Ordering::SeqCst);
                            async { Ok::<_, TestError>(()) }
                        },
                        CancellationToken::new(),
                    )
                    .await;
                prop_assert!(result.is_err());
            }
            prop_assert_eq!(dispatched.load(Ordering::SeqCst), 0);
            Ok(())
        })?;
    }

    /// Property: a success anywhere in CLOSED resets consecutive failures,
    /// so a sequence of (max_failures - 1) failures followed by a success
    /// followed by (max_failures - 1) more failures never trips the
    /// breaker.
    #[test]
    fn success_resets_consecutive_failure_count(max_failures in 2u32..=10) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breaker = CircuitBreaker::<TestError>::new(
                CircuitBreakerConfig::builder()
                    .max_failures(max_failures)
                    .build()
                    .unwrap(),
            );

            for _ in 0..(max_failures - 1) {
                let _ = breaker
                    .execute(|_t| async { Err::<(), _>(TestError) }, CancellationToken::new())
                    .await;
            }
            let _ = breaker
                .execute(|_t| async { Ok::<_, TestError>(()) }, CancellationToken::new())
                .await;
            for _ in 0..(max_failures - 1) {
                let _ = breaker
                    .execute(|_t| async { Err::<(), _>(TestError) }, CancellationToken::new())
                    .await;
            }

            prop_assert_eq!(breaker.state(), CircuitState::Closed);
            Ok(())
        })?;
    }
}
