//! Exercises the primitives nested together, the way a caller composes
//! them in front of a real downstream dependency.

use resilience_bulkhead::{Bulkhead, BulkheadConfig};
use resilience_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig};
use resilience_core::CancellationToken;
use resilience_retry::{Retry, RetryConfig, Retryable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct DownstreamError(&'static str);

impl Retryable for DownstreamError {}

#[tokio::test]
async fn bulkhead_wrapping_circuit_breaker_admits_and_forwards_result() {
    let bulkhead = Bulkhead::new(BulkheadConfig::builder().max_concurrent(2).build().unwrap());
    let breaker = CircuitBreaker::<DownstreamError>::new(
        CircuitBreakerConfig::builder().max_failures(3).build().unwrap(),
    );

    let result = bulkhead
        .execute(
            |inner_token| {
                let breaker = breaker.clone();
                async move {
                    breaker
                        .execute(|_t| async { Ok::<_, DownstreamError>(7) }, inner_token)
                        .await
                        .map_err(|_| DownstreamError("breaker rejected"))
                }
            },
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.unwrap(), 7);
}

#[tokio::test]
async fn circuit_breaker_opens_even_when_wrapped_by_bulkhead() {
    let bulkhead = Bulkhead::new(BulkheadConfig::builder().max_concurrent(5).build().unwrap());
    let breaker = CircuitBreaker::<DownstreamError>::new(
        CircuitBreakerConfig::builder().max_failures(2).build().unwrap(),
    );

    for _ in 0..2 {
        let breaker = breaker.clone();
        let _ = bulkhead
            .execute(
                move |inner_token| {
                    let breaker = breaker.clone();
                    async move {
                        breaker
                            .execute(
                                |_t| async { Err::<(), _>(DownstreamError("boom")) },
                                inner_token,
                            )
                            .await
                            .map_err(|_| DownstreamError("breaker rejected"))
                    }
                },
                CancellationToken::new(),
            )
            .await;
    }

    let breaker2 = breaker.clone();
    let result = bulkhead
        .execute(
            move |inner_token| {
                let breaker = breaker2.clone();
                async move {
                    breaker
                        .execute(|_t| async { Ok::<_, DownstreamError>(1) }, inner_token)
                        .await
                        .map_err(|_| DownstreamError("breaker rejected"))
                }
            },
            CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(
        breaker.state(),
        resilience_circuitbreaker::CircuitState::Open
    );
}

#[tokio::test]
async fn retry_wrapping_bulkhead_retries_past_a_transient_rejection() {
    let bulkhead = Arc::new(Bulkhead::new(
        BulkheadConfig::builder().max_concurrent(1).max_queue(0).build().unwrap(),
    ));
    let attempts = Arc::new(AtomicUsize::new(0));

    let retry = Retry::new(
        RetryConfig::<DownstreamError>::builder()
            .max_attempts(3)
            .initial_delay(std::time::Duration::from_millis(1))
            .build()
            .unwrap(),
    );

    let token = CancellationToken::new();
    let result = retry
        .execute(
            |inner_token| {
                let bulkhead = bulkhead.clone();
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    bulkhead
                        .execute(
                            |_t| async { Ok::<_, DownstreamError>(()) },
                            inner_token,
                        )
                        .await
                        .map_err(|_| DownstreamError("bulkhead rejected"))
                }
            },
            &token,
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
