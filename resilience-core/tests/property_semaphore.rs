//! Property tests for the FIFO semaphore.
//!
//! Invariants tested:
//! - `available_permits` never leaves `[0, max]` under any sequence of
//!   try_acquire/release calls
//! - Waiters are always resolved in enqueue order
//! - A cancelled waiter never receives a permit and never blocks the ones
//!   behind it

use proptest::prelude::*;
use resilience_core::cancellation::CancellationReason;
use resilience_core::{CancellationToken, Semaphore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
enum Op {
    TryAcquire,
    Release,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: available_permits stays within [0, max] for any sequence
    /// of try_acquire/release operations, regardless of ordering.
    #[test]
    fn available_permits_never_leaves_bounds(
        max in 1usize..=20,
        ops in prop::collection::vec(
            prop_oneof![Just(Op::TryAcquire), Just(Op::Release)],
            0..200,
        ),
    ) {
        let sem = Semaphore::new(max);
        for op in &ops {
            match op {
                Op::TryAcquire => { sem.try_acquire(); }
                Op::Release => sem.release(),
            }
            let available = sem.available_permits();
            prop_assert!(available <= max, "available {} exceeded max {}", available, max);
        }
    }

    /// Property: a successful try_acquire always decrements available by
    /// exactly one, and release (with no waiters) always increments it by
    /// at most one, clamped at max.
    #[test]
    fn try_acquire_and_release_move_by_one(max in 1usize..=10, num_ops in 0usize..100) {
        let sem = Semaphore::new(max);
        let mut modeled = max;
        for i in 0..num_ops {
            if i % 2 == 0 {
                let before = sem.available_permits();
                let acquired = sem.try_acquire();
                prop_assert_eq!(acquired, before > 0);
                if acquired {
                    modeled = modeled.saturating_sub(1);
                }
            } else {
                sem.release();
                modeled = (modeled + 1).min(max);
            }
            prop_assert_eq!(sem.available_permits(), modeled);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Property: concurrent waiters are always resolved in the order they
    /// enqueued, no matter how many permits are released at once.
    #[test]
    fn concurrent_waiters_resolve_in_fifo_order(num_waiters in 2usize..=12) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let sem = Arc::new(Semaphore::new(1));
            sem.try_acquire();

            let order = Arc::new(Mutex::new(Vec::new()));
            let started = Arc::new(AtomicUsize::new(0));
            let mut handles = Vec::new();

            for i in 0..num_waiters {
                let sem = Arc::clone(&sem);
                let order = Arc::clone(&order);
                let started = Arc::clone(&started);
                handles.push(tokio::spawn(async move {
                    // Busy-wait-free staggering: block until it's this
                    // waiter's turn to enqueue, so enqueue order is fixed.
                    while started.load(Ordering::SeqCst) != i {
                        tokio::task::yield_now().await;
                    }
                    started.fetch_add(1, Ordering::SeqCst);
                    let token = CancellationToken::new();
                    sem.acquire(&token).await.unwrap();
                    order.lock().unwrap().push(i);
                }));
            }

            while sem.waiter_count() < num_waiters {
                tokio::task::yield_now().await;
            }

            for _ in 0..num_waiters {
                sem.release();
                tokio::task::yield_now().await;
            }

            for h in handles {
                h.await.unwrap();
            }

            prop_assert_eq!(&*order.lock().unwrap(), &(0..num_waiters).collect::<Vec<_>>());
            Ok(())
        })?;
    }

    /// Property: reject_all always fails every currently-queued waiter and
    /// leaves the queue empty, regardless of how many were waiting.
    #[test]
    fn reject_all_drains_every_waiter(num_waiters in 1usize..=12) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let sem = Arc::new(Semaphore::new(0));
            let mut handles = Vec::new();
            for _ in 0..num_waiters {
                let sem = Arc::clone(&sem);
                handles.push(tokio::spawn(async move {
                    let token = CancellationToken::new();
                    sem.acquire(&token).await
                }));
            }

            while sem.waiter_count() < num_waiters {
                tokio::task::yield_now().await;
            }

            sem.reject_all(CancellationReason::new("draining"));

            for h in handles {
                prop_assert!(h.await.unwrap().is_err());
            }
            prop_assert_eq!(sem.waiter_count(), 0);
            Ok(())
        })?;
    }
}
