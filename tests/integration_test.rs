//! Integration tests for refresh-kit
//!
//! These tests verify end-to-end refresh behavior through the public API.

use refresh_kit::{EntryState, Error, LogMetrics, RefreshCache, RefreshMetrics};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

type Cache = RefreshCache<i64, i64, String>;

/// Producer that returns `2*key` on its first call and `2*key + 1` after.
#[derive(Clone, Default)]
struct Doubler {
    calls: Arc<AtomicUsize>,
}

impl Doubler {
    fn produce(
        &self,
        key: i64,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<i64, String>> + Send + 'static
    {
        let calls = self.calls.clone();
        move || {
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(if n == 0 { 2 * key } else { 2 * key + 1 })
            })
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn failing(
    calls: Arc<AtomicUsize>,
) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<i64, String>> + Send + 'static {
    move || {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("producer unavailable".to_string())
        })
    }
}

// ============================================================================
// End-to-end scenario
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refresh_scenario_end_to_end() {
    let cache = Cache::new();
    let doubler = Doubler::default();
    let barrier = Arc::new(Barrier::new(10));

    // 10 concurrent callers, nobody has seen a value yet.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let cache = cache.clone();
        let producer = doubler.produce(2);
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache.get(2, Some(&-1), producer).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(4));
    }
    assert_eq!(doubler.calls(), 1);

    // Caller learned 4 is stale; the refresh fails; 4 is served anyway.
    let failures = Arc::new(AtomicUsize::new(0));
    let value = cache.get(2, Some(&4), failing(failures.clone())).await;
    assert_eq!(value, Ok(4));
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    // After eviction nothing is left to fall back to.
    cache.remove(&2);
    let value = cache.get(2, Some(&4), failing(failures.clone())).await;
    assert_eq!(value, Err("producer unavailable".to_string()));
    assert_eq!(failures.load(Ordering::SeqCst), 2);

    // And the key is immediately retryable.
    let value = cache.get(2, Some(&4), || async { Ok(5) }).await;
    assert_eq!(value, Ok(5));
}

// ============================================================================
// Single-flight
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failure_is_shared() {
    let cache = Cache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..12 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get(7, None, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<i64, _>("boom".to_string())
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Err("boom".to_string()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.state(&7), Some(EntryState::Empty));
}

#[tokio::test]
async fn test_unrelated_keys_do_not_wait_on_each_other() {
    let cache = Cache::new();
    let (release, wait) = tokio::sync::oneshot::channel::<()>();

    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get(1, None, move || async move {
                    wait.await.ok();
                    Ok(1)
                })
                .await
        })
    };
    while !cache.is_in_flight(&1) {
        tokio::task::yield_now().await;
    }

    // Key 2 completes while key 1 is still pending.
    assert_eq!(cache.get(2, None, || async { Ok(2) }).await, Ok(2));
    assert!(cache.is_in_flight(&1));

    release.send(()).unwrap();
    assert_eq!(slow.await.unwrap(), Ok(1));
}

#[tokio::test]
async fn test_abandoned_callers_do_not_cancel_refresh() {
    let cache = Cache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = calls.clone();
    let caller = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get(3, None, move || async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(30)
                })
                .await
        })
    };
    while !cache.is_in_flight(&3) {
        tokio::task::yield_now().await;
    }
    caller.abort();

    while cache.is_in_flight(&3) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.cached(&3), Ok(30));
}

// ============================================================================
// Stale fallback
// ============================================================================

#[tokio::test]
async fn test_repeated_failures_keep_serving_last_good() {
    let cache = Cache::new();
    cache.get(1, None, || async { Ok(10) }).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let value = cache.get(1, Some(&10), failing(calls.clone())).await;
        assert_eq!(value, Ok(10));
    }
    // One attempt per call, no hidden retries.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.state(&1), Some(EntryState::Failed));

    let stats = cache.stats();
    assert_eq!(stats.stale_served, 3);
    assert_eq!(stats.failures, 0);

    assert_eq!(cache.get(1, Some(&10), || async { Ok(11) }).await, Ok(11));
    assert_eq!(cache.state(&1), Some(EntryState::Ready));
}

#[tokio::test]
async fn test_permanent_failure_without_value_fails_every_call() {
    let cache = Cache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for attempt in 1..=3 {
        let value = cache.get(1, None, failing(calls.clone())).await;
        assert!(value.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), attempt);
    }
    assert_eq!(cache.cached(&1), Err(Error::NoValueAvailable));
    assert_eq!(cache.stats().failures, 3);
}

// ============================================================================
// Eviction
// ============================================================================

#[tokio::test]
async fn test_remove_is_idempotent() {
    let cache = Cache::new();
    assert!(!cache.remove(&1));

    cache.get(1, None, || async { Ok(1) }).await.unwrap();
    assert_eq!(cache.len(), 1);
    assert!(cache.remove(&1));
    assert!(!cache.remove(&1));
    assert!(cache.is_empty());
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn test_get_after_remove_invokes_producer() {
    let cache = Cache::new();
    let doubler = Doubler::default();

    assert_eq!(cache.get(5, None, doubler.produce(5)).await, Ok(10));
    cache.remove(&5);
    // The hint says nothing is known, and the value is gone anyway.
    assert_eq!(cache.get(5, Some(&3), doubler.produce(5)).await, Ok(11));
    assert_eq!(doubler.calls(), 2);
}

#[tokio::test]
async fn test_remove_during_refresh_forgets_result() {
    let cache = Cache::new();
    let (release, wait) = tokio::sync::oneshot::channel::<()>();

    let pending = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get(9, None, move || async move {
                    wait.await.ok();
                    Ok(90)
                })
                .await
        })
    };
    while !cache.is_in_flight(&9) {
        tokio::task::yield_now().await;
    }

    cache.remove(&9);
    release.send(()).unwrap();
    assert_eq!(pending.await.unwrap(), Ok(90));

    // The orphaned result did not land; the next get produces again.
    assert_eq!(cache.cached(&9), Err(Error::NoValueAvailable));
    assert_eq!(cache.get(9, None, || async { Ok(91) }).await, Ok(91));
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Clone, Default)]
struct RecordingMetrics {
    events: Arc<Mutex<Vec<String>>>,
}

impl RefreshMetrics for RecordingMetrics {
    fn record_hit(&self, key: &dyn Debug) {
        self.push(format!("hit {:?}", key));
    }

    fn record_refresh(&self, key: &dyn Debug, _duration: Duration) {
        self.push(format!("refresh {:?}", key));
    }

    fn record_stale_served(&self, key: &dyn Debug, failures: u32) {
        self.push(format!("stale {:?} {}", key, failures));
    }

    fn record_failure(&self, key: &dyn Debug) {
        self.push(format!("failure {:?}", key));
    }

    fn record_evict(&self, key: &dyn Debug) {
        self.push(format!("evict {:?}", key));
    }
}

impl RecordingMetrics {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn test_custom_metrics_see_every_outcome() {
    let metrics = RecordingMetrics::default();
    let cache = Cache::new().with_metrics(Box::new(metrics.clone()));
    let calls = Arc::new(AtomicUsize::new(0));

    cache.get(1, None, || async { Ok(1) }).await.unwrap();
    cache.get(1, Some(&0), || async { Ok(2) }).await.unwrap();
    cache.get(1, Some(&1), failing(calls.clone())).await.unwrap();
    cache.remove(&1);
    cache.get(1, None, failing(calls)).await.unwrap_err();

    let events = metrics.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "refresh 1".to_string(),
            "hit 1".to_string(),
            "stale 1 1".to_string(),
            "evict 1".to_string(),
            "failure 1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_log_metrics_can_be_installed() {
    let _ = env_logger::builder().is_test(true).try_init();

    let cache = Cache::new().with_metrics(Box::new(LogMetrics));
    assert_eq!(cache.get(1, None, || async { Ok(1) }).await, Ok(1));
}
