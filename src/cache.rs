//! Manually invalidated refresh cache.
//!
//! [`RefreshCache`] stores one value per key. A caller that suspects its copy
//! went stale (say, the connection it describes was refused) hands that copy
//! back as a hint:
//!
//! - if the cache already holds something *different* from the hint, some
//!   other caller refreshed in the meantime and that value is returned
//!   without running the producer;
//! - otherwise the producer runs, once, for all concurrent callers of that
//!   key, and a failure falls back to the last good value when there is one.
//!
//! ```ignore
//! use refresh_kit::RefreshCache;
//!
//! let routes: RefreshCache<String, Arc<RouteTable>, FetchError> = RefreshCache::new();
//!
//! let table = routes.get("orders".into(), None, || fetch_routes("orders")).await?;
//! // ... a request fails with a routing error ...
//! let table = routes
//!     .get("orders".into(), Some(&table), || fetch_routes("orders"))
//!     .await?;
//! ```

use crate::error::{Error, Result};
use crate::gate::{Decision, RefreshGate, RefreshPlan, Version, Versioned};
use crate::observability::{CacheStats, RefreshMetrics};
use crate::policy::EntryState;
use crate::serialization::Snapshot;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

/// Hint-driven single-flight cache with stale-on-failure fallback.
///
/// Cloning is cheap: clones share entries.
pub struct RefreshCache<K, V, E> {
    gate: RefreshGate<K, V, E>,
}

impl<K, V, E> Clone for RefreshCache<K, V, E> {
    fn clone(&self) -> Self {
        RefreshCache {
            gate: self.gate.clone(),
        }
    }
}

impl<K: Eq + Hash, V, E> Debug for RefreshCache<K, V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCache")
            .field("gate", &self.gate)
            .finish()
    }
}

impl<K, V, E> Default for RefreshCache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> RefreshCache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty cache.
    pub fn new() -> Self {
        RefreshCache {
            gate: RefreshGate::new(),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(self, metrics: Box<dyn RefreshMetrics>) -> Self {
        RefreshCache {
            gate: self.gate.with_metrics(metrics),
        }
    }

    /// Like [`get`](Self::get), but staleness is judged by version instead
    /// of value equality, so two refreshes producing equal values are still
    /// told apart.
    ///
    /// `seen` is the version the caller last received, `None` if it holds
    /// nothing yet.
    pub async fn get_versioned<F, Fut>(
        &self,
        key: K,
        seen: Option<Version>,
        producer: F,
    ) -> std::result::Result<Versioned<V>, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        self.gate
            .get_with(
                key,
                |view| match view.last_good {
                    Some(current) if seen != Some(current.version) => {
                        Decision::Serve(current.clone())
                    }
                    current => Decision::Refresh(RefreshPlan::with_fallback(current.cloned())),
                },
                producer,
            )
            .await
    }

    /// Forget `key`. Idempotent; returns whether an entry was present.
    ///
    /// A refresh in flight for `key` keeps running for the callers already
    /// waiting on it, but the next `get` invokes the producer again.
    pub fn remove(&self, key: &K) -> bool {
        self.gate.remove(key)
    }

    /// Last good value for `key` without refreshing.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoValueAvailable` if no refresh for `key` ever
    /// succeeded (or it was removed since).
    pub fn cached(&self, key: &K) -> Result<V> {
        self.gate
            .last_good(key)
            .map(|good| good.value)
            .ok_or(Error::NoValueAvailable)
    }

    /// Lifecycle state of `key`, `None` if absent.
    pub fn state(&self, key: &K) -> Option<EntryState> {
        self.gate.state(key)
    }

    /// Whether a refresh is running for `key`.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.gate.is_in_flight(key)
    }

    pub fn len(&self) -> usize {
        self.gate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gate.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.gate.stats()
    }

    /// Export every key's last good value.
    pub fn snapshot(&self) -> Snapshot<K, V> {
        Snapshot::from_entries(self.gate.last_good_values())
    }

    /// Install a snapshot's values as `Ready` entries.
    ///
    /// Keys with a refresh in flight are skipped. Returns how many values
    /// were installed.
    pub fn restore(&self, snapshot: Snapshot<K, V>) -> usize {
        let restored = snapshot
            .into_entries()
            .into_iter()
            .map(|(key, value)| self.gate.seed(key, value))
            .filter(|installed| *installed)
            .count();
        debug!("Restored {} entries from snapshot", restored);
        restored
    }
}

impl<K, V, E> RefreshCache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Get the value for `key`.
    ///
    /// `hint` is the value the caller currently holds (`None` if it holds
    /// nothing). If the cache holds a value different from `hint`, that
    /// value is returned and `producer` is not called. Otherwise `producer`
    /// is invoked, at most once across all concurrent callers for `key`:
    ///
    /// - on success the new value is stored and returned;
    /// - on failure the last good value is returned if there is one;
    /// - otherwise the producer's error is returned as is, and the next call
    ///   tries again.
    pub async fn get<F, Fut>(
        &self,
        key: K,
        hint: Option<&V>,
        producer: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        self.gate
            .get_with(
                key,
                |view| match view.last_good {
                    Some(current) if hint != Some(&current.value) => {
                        Decision::Serve(current.clone())
                    }
                    current => Decision::Refresh(RefreshPlan::with_fallback(current.cloned())),
                },
                producer,
            )
            .await
            .map(|fresh| fresh.value)
    }
}
