use std::sync::Arc;
use std::time::Duration;

use resilience_core::{sleep, CancellationToken, Semaphore};

#[tokio::test]
async fn semaphore_never_exceeds_configured_max_under_contention() {
    let sem = Arc::new(Semaphore::new(3));
    let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let sem = Arc::clone(&sem);
        let active = Arc::clone(&active);
        let max_seen = Arc::clone(&max_seen);
        handles.push(tokio::spawn(async move {
            let token = CancellationToken::new();
            sem.acquire(&token).await.unwrap();
            let now = active.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            active.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            sem.release();
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    assert!(max_seen.load(std::sync::atomic::Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn sleep_and_token_trip_race_cleanly() {
    let token = CancellationToken::new();
    let trip_token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trip_token.trip("cut short");
    });

    let result = sleep(Duration::from_secs(30), &token).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn derived_token_from_timeout_cancels_semaphore_wait() {
    let sem = Arc::new(Semaphore::new(0));
    let parent = CancellationToken::new();
    let (child, _trip) = parent.derive();

    let sem_for_wait = Arc::clone(&sem);
    let wait = tokio::spawn(async move { sem_for_wait.acquire(&child).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    parent.trip("deadline exceeded");

    let result = wait.await.unwrap();
    assert!(result.is_err());
}
