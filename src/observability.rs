//! Observability for refresh caches.
//!
//! Two concerns live here:
//!
//! - **Metrics (`RefreshMetrics`)**: hooks for hits, joins, refreshes, stale
//!   fallbacks, failures and evictions, so callers can feed their own
//!   monitoring system.
//! - **Stats (`CacheStats`)**: a cheap snapshot of the counters every cache
//!   keeps regardless of which metrics sink is installed.
//!
//! ```ignore
//! use refresh_kit::observability::RefreshMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl RefreshMetrics for PrometheusMetrics {
//!     fn record_refresh(&self, _key: &dyn std::fmt::Debug, _duration: Duration) {
//!         // histogram!("token_refresh_latency").record(duration);
//!     }
//!     // ... other hooks keep their log-based defaults
//! }
//!
//! // let cache = RefreshCache::new().with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! A stale fallback is not an error to the caller; `record_stale_served` and
//! `CacheStats::stale_served` are the only places it shows up.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Trait for refresh metrics collection.
pub trait RefreshMetrics: Send + Sync {
    /// A cached value was served without invoking the producer.
    fn record_hit(&self, key: &dyn Debug) {
        debug!("Refresh HIT: {:?}", key);
    }

    /// A caller attached itself to a refresh already in flight.
    fn record_join(&self, key: &dyn Debug) {
        debug!("Refresh JOIN: {:?}", key);
    }

    /// A refresh produced a new value.
    fn record_refresh(&self, key: &dyn Debug, duration: Duration) {
        debug!("Refresh OK: {:?} took {:?}", key, duration);
    }

    /// A refresh failed and the previous value was handed out instead.
    fn record_stale_served(&self, key: &dyn Debug, failures: u32) {
        warn!(
            "Refresh STALE: {:?} served last good value ({} failure(s) since last success)",
            key, failures
        );
    }

    /// A refresh failed with no fallback; the error reached the caller.
    fn record_failure(&self, key: &dyn Debug) {
        warn!("Refresh FAILED: {:?} (no fallback available)", key);
    }

    /// An entry was removed.
    fn record_evict(&self, key: &dyn Debug) {
        debug!("Refresh EVICT: {:?}", key);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Debug, Default)]
pub struct NoOpMetrics;

impl RefreshMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &dyn Debug) {}
    fn record_join(&self, _key: &dyn Debug) {}
    fn record_refresh(&self, _key: &dyn Debug, _duration: Duration) {}
    fn record_stale_served(&self, _key: &dyn Debug, _failures: u32) {}
    fn record_failure(&self, _key: &dyn Debug) {}
    fn record_evict(&self, _key: &dyn Debug) {}
}

/// Metrics implementation that only writes to the `log` facade.
#[derive(Clone, Debug, Default)]
pub struct LogMetrics;

impl RefreshMetrics for LogMetrics {}

/// Point-in-time view of a cache's counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Keys currently present in the entry map.
    pub entries: usize,
    /// Keys with a refresh in flight.
    pub in_flight: usize,
    /// Calls answered from the cache without touching the producer.
    pub hits: u64,
    /// Calls that attached to an in-flight refresh.
    pub joins: u64,
    /// Producer invocations.
    pub refreshes: u64,
    /// Failed refreshes answered with the last good value.
    pub stale_served: u64,
    /// Failed refreshes whose error reached the callers.
    pub failures: u64,
    /// Entries removed through `remove`.
    pub evictions: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    joins: AtomicU64,
    refreshes: AtomicU64,
    stale_served: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize, in_flight: usize) -> CacheStats {
        CacheStats {
            entries,
            in_flight,
            hits: self.hits.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
