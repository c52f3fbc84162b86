//! A FIFO-fair async semaphore with cancellable, O(1)-removable waiters.
//!
//! Unlike `tokio::sync::Semaphore`, waiters are resolved strictly in
//! enqueue order and a cancelled waiter is removed from the queue without
//! disturbing the order of the others, which the bulkhead and rate-limiter
//! wait paths depend on.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::cancellation::{CancellationReason, CancellationToken};

/// Why [`Semaphore::acquire`] failed.
#[derive(Debug, Clone, Error)]
pub enum AcquireError {
    /// The token passed to `acquire` was tripped.
    #[error("acquire cancelled: {0}")]
    Cancelled(CancellationReason),

    /// The semaphore was bulk-rejected via [`Semaphore::reject_all`] while
    /// this caller was waiting.
    #[error("acquire rejected: {0}")]
    Rejected(CancellationReason),
}

struct Waiter {
    id: u64,
    sender: oneshot::Sender<Result<(), AcquireError>>,
}

struct State {
    available: usize,
    max: usize,
    waiters: VecDeque<Waiter>,
}

/// A counting semaphore with FIFO-ordered, cancel-safe waiters.
pub struct Semaphore {
    state: Mutex<State>,
    next_waiter_id: AtomicU64,
}

impl Semaphore {
    /// Creates a semaphore with `permits` available permits (also the
    /// ceiling that `release` clamps to).
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(State {
                available: permits,
                max: permits,
                waiters: VecDeque::new(),
            }),
            next_waiter_id: AtomicU64::new(0),
        }
    }

    /// Number of permits currently available without waiting.
    pub fn available_permits(&self) -> usize {
        self.state.lock().expect("semaphore lock poisoned").available
    }

    /// Number of callers currently queued waiting for a permit.
    pub fn waiter_count(&self) -> usize {
        self.state.lock().expect("semaphore lock poisoned").waiters.len()
    }

    /// Attempts to acquire a permit without waiting. Never blocks.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("semaphore lock poisoned");
        if state.available > 0 {
            state.available -= 1;
            true
        } else {
            false
        }
    }

    /// Acquires a permit, waiting in FIFO order if none are immediately
    /// available. If `token` is already tripped, fails without enqueueing.
    /// If `token` trips while waiting, the waiter is removed from the
    /// queue in O(1) without disturbing the order of the rest.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<(), AcquireError> {
        if token.tripped() {
            let reason = token
                .reason()
                .unwrap_or_else(|| CancellationReason::new("cancelled"));
            return Err(AcquireError::Cancelled(reason));
        }

        if self.try_acquire() {
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        let waiter_id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.lock().expect("semaphore lock poisoned");
            // Re-check under the lock: a release() may have landed between
            // our try_acquire() and taking the lock here.
            if state.available > 0 {
                state.available -= 1;
                return Ok(());
            }
            state.waiters.push_back(Waiter {
                id: waiter_id,
                sender: tx,
            });
        }

        tokio::select! {
            result = rx => {
                match result {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AcquireError::Cancelled(CancellationReason::new("semaphore dropped"))),
                }
            }
            _ = token.cancelled() => {
                self.remove_waiter(waiter_id);
                let reason = token
                    .reason()
                    .unwrap_or_else(|| CancellationReason::new("cancelled"));
                Err(AcquireError::Cancelled(reason))
            }
        }
    }

    fn remove_waiter(&self, id: u64) {
        let mut state = self.state.lock().expect("semaphore lock poisoned");
        if let Some(pos) = state.waiters.iter().position(|w| w.id == id) {
            state.waiters.remove(pos);
        }
    }

    /// Releases a permit. If a waiter is queued, hands the permit directly
    /// to the head-of-line waiter (resolving its wait) without ever
    /// incrementing `available`. Otherwise increments `available`, clamped
    /// at the configured maximum so that a caller releasing without having
    /// acquired (a cleanup path) cannot overflow capacity.
    pub fn release(&self) {
        let mut state = self.state.lock().expect("semaphore lock poisoned");
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.sender.send(Ok(())).is_ok() {
                return;
            }
            // Receiver already dropped (e.g. raced with cancellation);
            // try the next waiter in line instead of losing the permit.
        }
        state.available = (state.available + 1).min(state.max);
    }

    /// Fails every currently-queued waiter with `reason` and empties the
    /// queue. Does not change `available`.
    pub fn reject_all(&self, reason: CancellationReason) {
        let mut state = self.state.lock().expect("semaphore lock poisoned");
        for waiter in state.waiters.drain(..) {
            let _ = waiter.sender.send(Err(AcquireError::Rejected(reason.clone())));
        }
    }
}

/// Cheaply-shareable handle; cloning shares the same underlying state.
pub type SharedSemaphore = Arc<Semaphore>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn try_acquire_respects_permit_count() {
        let sem = Semaphore::new(2);
        assert!(sem.try_acquire());
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        assert_eq!(sem.available_permits(), 0);
    }

    #[test]
    fn release_clamps_at_max() {
        let sem = Semaphore::new(1);
        sem.release();
        sem.release();
        assert_eq!(sem.available_permits(), 1);
    }

    #[tokio::test]
    async fn acquire_resolves_immediately_when_permits_available() {
        let sem = Semaphore::new(1);
        let token = CancellationToken::new();
        sem.acquire(&token).await.unwrap();
        assert_eq!(sem.available_permits(), 0);
    }

    #[tokio::test]
    async fn waiters_resolve_in_fifo_order() {
        let sem = Arc::new(Semaphore::new(1));
        sem.try_acquire();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..5 {
            let sem = Arc::clone(&sem);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let token = CancellationToken::new();
                // stagger enqueue so ordering is deterministic
                tokio::time::sleep(Duration::from_millis(i * 5)).await;
                sem.acquire(&token).await.unwrap();
                order.lock().unwrap().push(i);
            }));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        for _ in 0..5 {
            sem.release();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn cancelled_waiter_is_removed_without_disturbing_others() {
        let sem = Arc::new(Semaphore::new(1));
        sem.try_acquire();

        let sem_a = Arc::clone(&sem);
        let token_a = CancellationToken::new();
        let token_a_trip = token_a.clone();
        let a = tokio::spawn(async move { sem_a.acquire(&token_a).await });

        tokio::time::sleep(Duration::from_millis(10)).await;

        let sem_b = Arc::clone(&sem);
        let token_b = CancellationToken::new();
        let b = tokio::spawn(async move { sem_b.acquire(&token_b).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sem.waiter_count(), 2);

        token_a_trip.trip("gave up");
        let result_a = a.await.unwrap();
        assert!(result_a.is_err());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sem.waiter_count(), 1);

        sem.release();
        let result_b = b.await.unwrap();
        assert!(result_b.is_ok());
    }

    #[tokio::test]
    async fn acquire_fails_without_enqueueing_if_already_tripped() {
        let sem = Semaphore::new(0);
        let token = CancellationToken::new();
        token.trip("already gone");
        let result = sem.acquire(&token).await;
        assert!(result.is_err());
        assert_eq!(sem.waiter_count(), 0);
    }

    #[tokio::test]
    async fn reject_all_fails_every_waiter_and_empties_queue() {
        let sem = Arc::new(Semaphore::new(0));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let sem = Arc::clone(&sem);
            handles.push(tokio::spawn(async move {
                let token = CancellationToken::new();
                sem.acquire(&token).await
            }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sem.waiter_count(), 3);

        sem.reject_all(CancellationReason::new("shutting down"));

        for h in handles {
            assert!(h.await.unwrap().is_err());
        }
        assert_eq!(sem.waiter_count(), 0);
        assert_eq!(sem.available_permits(), 0);
    }
}
