//! Cancellation primitives: a composable single-shot signal and a
//! cancellable sleep built on top of it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;

/// Why a [`CancellationToken`] was tripped.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CancellationReason(pub Arc<str>);

impl CancellationReason {
    /// Creates a new reason from any displayable value.
    pub fn new(reason: impl fmt::Display) -> Self {
        Self(Arc::from(reason.to_string()))
    }
}

impl From<&str> for CancellationReason {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CancellationReason {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

type TripCallback = Box<dyn FnOnce(CancellationReason) + Send>;

struct Inner {
    tripped: AtomicBool,
    reason: Mutex<Option<CancellationReason>>,
    notify: Notify,
    /// Callbacks registered via `on_trip`, fired once (in registration order)
    /// the first time this token trips.
    callbacks: Mutex<Vec<(u64, TripCallback)>>,
    next_callback_id: AtomicU64,
    /// Subscriptions this token holds against its own parents (from
    /// `derive`/`any`). Cancelled on first trip and on drop, so a token
    /// that never trips doesn't pin its parents' callback lists forever.
    upstream: Mutex<Vec<Unsubscribe>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for unsub in std::mem::take(self.upstream.get_mut().expect("cancellation upstream lock poisoned")) {
            unsub.cancel();
        }
    }
}

/// A cloneable, composable single-shot cancellation signal.
///
/// Tripping is idempotent: only the first trip's reason is recorded, and
/// every clone observes the same state immediately. Derived tokens
/// ([`CancellationToken::derive`], [`CancellationToken::any`]) trip when
/// any of their parents trip, propagating the first parent's reason.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new, untripped token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tripped: AtomicBool::new(false),
                reason: Mutex::new(None),
                notify: Notify::new(),
                callbacks: Mutex::new(Vec::new()),
                next_callback_id: AtomicU64::new(0),
                upstream: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns `true` if [`trip`](Self::trip) has been called.
    pub fn tripped(&self) -> bool {
        self.inner.tripped.load(Ordering::Acquire)
    }

    /// Returns the reason this token was tripped with, if any.
    pub fn reason(&self) -> Option<CancellationReason> {
        self.inner.reason.lock().expect("cancellation reason lock poisoned").clone()
    }

    /// Trips the token. Idempotent: only the first call records a reason,
    /// wakes waiters, fires registered [`on_trip`](Self::on_trip) callbacks,
    /// and unsubscribes from every parent this token was derived from.
    pub fn trip(&self, reason: impl Into<CancellationReason>) {
        let already_tripped = self.inner.tripped.swap(true, Ordering::AcqRel);
        if !already_tripped {
            let reason = reason.into();
            *self.inner.reason.lock().expect("cancellation reason lock poisoned") =
                Some(reason.clone());
            self.inner.notify.notify_waiters();

            let callbacks = std::mem::take(
                &mut *self.inner.callbacks.lock().expect("cancellation callbacks lock poisoned"),
            );
            for (_, callback) in callbacks {
                callback(reason.clone());
            }

            let upstream = std::mem::take(
                &mut *self.inner.upstream.lock().expect("cancellation upstream lock poisoned"),
            );
            for unsub in upstream {
                unsub.cancel();
            }
        }
    }

    /// Registers a callback that fires at most once, the first time the
    /// token trips. Returns an unsubscribe handle; dropping it without
    /// calling [`Unsubscribe::cancel`] leaves the callback registered.
    ///
    /// If the token is already tripped, the callback fires immediately
    /// (synchronously, before this method returns). Unlike a spawned
    /// `cancelled().await` loop, an untripped registration costs nothing
    /// but a boxed closure sitting in this token's callback list until it
    /// trips, is cancelled, or this token is dropped.
    pub fn on_trip<F>(&self, callback: F) -> Unsubscribe
    where
        F: FnOnce(CancellationReason) + Send + 'static,
    {
        if self.tripped() {
            if let Some(reason) = self.reason() {
                callback(reason);
            }
            return Unsubscribe::noop();
        }

        let id = self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed);
        let mut callbacks = self.inner.callbacks.lock().expect("cancellation callbacks lock poisoned");
        // trip() may have run between the check above and acquiring the lock.
        if self.inner.tripped.load(Ordering::Acquire) {
            drop(callbacks);
            if let Some(reason) = self.reason() {
                callback(reason);
            }
            return Unsubscribe::noop();
        }
        callbacks.push((id, Box::new(callback)));
        drop(callbacks);

        Unsubscribe {
            target: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Waits until this token is tripped. Resolves immediately if already
    /// tripped.
    pub async fn cancelled(&self) {
        if self.tripped() {
            return;
        }
        loop {
            let notified = self.inner.notify.notified();
            if self.tripped() {
                return;
            }
            notified.await;
            if self.tripped() {
                return;
            }
        }
    }

    /// Returns a child token that trips whenever `self` trips, propagating
    /// `self`'s reason. The returned trip function can also be used to trip
    /// the child independently of the parent.
    ///
    /// The child unsubscribes from `self` as soon as it trips for any
    /// reason, and also on drop if it never trips at all, so a long-lived
    /// parent never pins a short-lived, never-tripped child in memory.
    pub fn derive(&self) -> (CancellationToken, impl Fn(CancellationReason) + Send + Sync + 'static) {
        let child = CancellationToken::new();
        let trip_child = {
            let child = child.clone();
            move |reason: CancellationReason| child.trip(reason)
        };

        if self.tripped() {
            if let Some(reason) = self.reason() {
                child.trip(reason);
            }
        } else {
            let unsub = self.on_trip(propagate_to(&child));
            child
                .inner
                .upstream
                .lock()
                .expect("cancellation upstream lock poisoned")
                .push(unsub);
        }

        (child, trip_child)
    }

    /// Returns a child token that trips as soon as any of `tokens` trips,
    /// propagating the first one's reason. Already-tripped inputs are
    /// detected eagerly without subscribing to the rest.
    ///
    /// The child unsubscribes from every `tokens` entry as soon as it trips,
    /// and on drop if none of them ever trip, so a call that races a bound
    /// token against a timeout token doesn't leave a dangling subscription
    /// on whichever one never fires.
    pub fn any(tokens: &[CancellationToken]) -> CancellationToken {
        let child = CancellationToken::new();

        if let Some(already) = tokens.iter().find(|t| t.tripped()) {
            if let Some(reason) = already.reason() {
                child.trip(reason);
            }
            return child;
        }

        let upstream: Vec<Unsubscribe> = tokens
            .iter()
            .map(|token| token.on_trip(propagate_to(&child)))
            .collect();
        *child.inner.upstream.lock().expect("cancellation upstream lock poisoned") = upstream;

        child
    }
}

/// Builds an `on_trip` callback that trips `child` when fired, holding only
/// a weak reference so the subscribing parent never keeps `child` alive.
fn propagate_to(child: &CancellationToken) -> impl FnOnce(CancellationReason) + Send + 'static {
    let child_weak = Arc::downgrade(&child.inner);
    move |reason: CancellationReason| {
        if let Some(inner) = child_weak.upgrade() {
            CancellationToken { inner }.trip(reason);
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("tripped", &self.tripped())
            .finish()
    }
}

/// Handle returned by [`CancellationToken::on_trip`]. Dropping it without
/// calling [`cancel`](Self::cancel) leaves the callback registered.
pub struct Unsubscribe {
    target: Weak<Inner>,
    id: u64,
}

impl Unsubscribe {
    fn noop() -> Self {
        Self {
            target: Weak::new(),
            id: 0,
        }
    }

    /// Removes the callback from the token's pending list, if it is still
    /// there and has not already fired. A no-op if the token has already
    /// dropped or the callback already ran.
    pub fn cancel(self) {
        if let Some(inner) = self.target.upgrade() {
            inner
                .callbacks
                .lock()
                .expect("cancellation callbacks lock poisoned")
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// The reason a [`sleep`] call failed.
#[derive(Debug, Clone, Error)]
pub enum SleepError {
    /// The token was tripped before or during the sleep.
    #[error("sleep aborted: {0}")]
    Aborted(CancellationReason),
}

/// Sleeps for `duration`, or fails early if `token` trips first.
///
/// If `token` is already tripped at entry, fails immediately without
/// scheduling a timer. The timer is dropped (and so cancelled) on every
/// exit path, including early return on token trip.
pub async fn sleep(duration: Duration, token: &CancellationToken) -> Result<(), SleepError> {
    if token.tripped() {
        let reason = token
            .reason()
            .unwrap_or_else(|| CancellationReason::new("cancelled"));
        return Err(SleepError::Aborted(reason));
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = token.cancelled() => {
            let reason = token
                .reason()
                .unwrap_or_else(|| CancellationReason::new("cancelled"));
            Err(SleepError::Aborted(reason))
        }
    }
}
