//! Bulkhead: caps concurrent executions with an optional bounded FIFO
//! admission queue.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use resilience_core::{CancellationToken, Semaphore};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::config::BulkheadConfig;
use crate::error::BulkheadError;
use crate::events::BulkheadEvent;

/// Caps concurrent in-flight operations at `max_concurrent`, optionally
/// queueing up to `max_queue` further callers with a per-caller timeout.
pub struct Bulkhead {
    config: Arc<BulkheadConfig>,
    execution: Arc<Semaphore>,
    queue: Option<Arc<Semaphore>>,
    closed: AtomicBool,
}

impl Bulkhead {
    /// Creates a new bulkhead from `config`.
    pub fn new(config: BulkheadConfig) -> Self {
        let execution = Arc::new(Semaphore::new(config.max_concurrent));
        let queue = if config.max_queue > 0 {
            Some(Arc::new(Semaphore::new(config.max_queue)))
        } else {
            None
        };
        Self {
            config: Arc::new(config),
            execution,
            queue,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of operations currently executing.
    pub fn active_count(&self) -> usize {
        self.config.max_concurrent - self.execution.available_permits()
    }

    /// Number of callers currently queued for an execution permit.
    pub fn queued_count(&self) -> usize {
        self.queue
            .as_ref()
            .map(|q| self.config.max_queue - q.available_permits())
            .unwrap_or(0)
    }

    /// Closes the bulkhead: every current and future admission attempt
    /// fails with [`BulkheadError::BulkheadClosed`] until [`reset`](Self::reset)
    /// is called. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let reason = resilience_core::cancellation::CancellationReason::new("bulkhead closed");
        self.execution.reject_all(reason.clone());
        if let Some(queue) = &self.queue {
            queue.reject_all(reason);
        }
    }

    /// Clears the closed flag. Acquired/queued state is otherwise
    /// unaffected.
    pub fn reset(&self) {
        self.closed.store(false, Ordering::Release);
    }

    /// Returns `true` if [`close`](Self::close) has been called without a
    /// subsequent [`reset`](Self::reset).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Runs `op` under the bulkhead's admission policy.
    ///
    /// `op` receives a cancellation token derived from the caller's
    /// `token`; the bulkhead never forcibly aborts `op` once admitted.
    pub async fn execute<F, Fut, T, E>(
        &self,
        op: F,
        token: CancellationToken,
    ) -> Result<T, BulkheadError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.is_closed() {
            return Err(BulkheadError::BulkheadClosed);
        }
        if token.tripped() {
            return Err(BulkheadError::Cancelled);
        }

        if self.execution.try_acquire() {
            return self.run_permitted(op, token).await;
        }

        if self.queue.is_none() {
            self.emit_rejected();
            return Err(BulkheadError::BulkheadFull {
                active_count: self.active_count(),
                queued_count: 0,
            });
        }
        let queue = self.queue.as_ref().unwrap();

        if !queue.try_acquire() {
            self.emit_rejected();
            return Err(BulkheadError::BulkheadFull {
                active_count: self.active_count(),
                queued_count: self.queued_count(),
            });
        }

        self.emit_queued();

        // The queue-admission permit is released on every exit path below.
        let result = self.wait_then_run(op, token).await;
        queue.release();
        result
    }

    async fn wait_then_run<F, Fut, T, E>(
        &self,
        op: F,
        token: CancellationToken,
    ) -> Result<T, BulkheadError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let timeout_token = CancellationToken::new();
        let timer = self.config.queue_timeout.map(|duration| {
            let timeout_token = timeout_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                timeout_token.trip("bulkhead queue timeout");
            })
        });

        let combined = CancellationToken::any(&[token.clone(), timeout_token.clone()]);
        let acquire_result = self.execution.acquire(&combined).await;

        if let Some(timer) = timer {
            timer.abort();
        }

        match acquire_result {
            Ok(()) => self.run_permitted(op, token).await,
            Err(_) => {
                self.emit_rejected();
                if timeout_token.tripped() {
                    Err(BulkheadError::QueueTimeout)
                } else {
                    Err(BulkheadError::Cancelled)
                }
            }
        }
    }

    async fn run_permitted<F, Fut, T, E>(
        &self,
        op: F,
        token: CancellationToken,
    ) -> Result<T, BulkheadError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let active_count = self.active_count();
        self.config.event_listeners.emit(&BulkheadEvent::CallPermitted {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            active_count,
        });
        #[cfg(feature = "metrics")]
        {
            counter!("bulkhead_calls_permitted_total", "bulkhead" => self.config.name.clone())
                .increment(1);
            gauge!("bulkhead_active_count", "bulkhead" => self.config.name.clone())
                .set(active_count as f64);
        }

        let start = Instant::now();
        let result = op(token).await;
        self.execution.release();

        let duration = start.elapsed();
        match &result {
            Ok(_) => {
                self.config.event_listeners.emit(&BulkheadEvent::CallFinished {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    duration,
                });
                #[cfg(feature = "metrics")]
                counter!("bulkhead_calls_finished_total", "bulkhead" => self.config.name.clone())
                    .increment(1);
            }
            Err(_) => {
                self.config.event_listeners.emit(&BulkheadEvent::CallFailed {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    duration,
                });
                #[cfg(feature = "metrics")]
                counter!("bulkhead_calls_failed_total", "bulkhead" => self.config.name.clone())
                    .increment(1);
            }
        }

        result.map_err(BulkheadError::Inner)
    }

    fn emit_rejected(&self) {
        self.config.event_listeners.emit(&BulkheadEvent::CallRejected {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            active_count: self.active_count(),
            queued_count: self.queued_count(),
        });
        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_rejected_total", "bulkhead" => self.config.name.clone())
            .increment(1);
    }

    fn emit_queued(&self) {
        self.config.event_listeners.emit(&BulkheadEvent::CallQueued {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            queued_count: self.queued_count(),
        });
    }
}
