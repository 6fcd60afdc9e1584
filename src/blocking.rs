//! Synchronous front end for threaded callers.
//!
//! [`BlockingRefreshCache`] has the semantics of
//! [`RefreshCache`](crate::cache::RefreshCache) for code that is not async.
//! It owns a small Tokio runtime; producers are plain closures run on that
//! runtime's blocking pool, and callers park their thread until the shared
//! refresh resolves. Concurrent callers for one key still share a single
//! producer invocation.
//!
//! ```
//! use refresh_kit::BlockingRefreshCache;
//!
//! let cache: BlockingRefreshCache<&str, u32, String> = BlockingRefreshCache::new().unwrap();
//! assert_eq!(cache.get("answer", None, || Ok(42)), Ok(42));
//! assert_eq!(cache.cached(&"answer"), Ok(42));
//! ```
//!
//! # Panics
//!
//! Every method that waits (`get`, `get_versioned`) panics when called from
//! within an async context, as would any other blocking call there. Use
//! `RefreshCache` from async code.
//!
//! Dropping the last clone of a cache also drops its runtime, which panics
//! inside an async context as well. Let the cache go out of scope on a plain
//! thread, or hand it to `tokio::task::spawn_blocking` to be dropped there.

use crate::cache::RefreshCache;
use crate::error::{Error, Result};
use crate::gate::{Version, Versioned};
use crate::observability::{CacheStats, RefreshMetrics};
use crate::policy::EntryState;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

/// Default number of runtime worker threads.
const DEFAULT_WORKERS: usize = 2;

/// Blocking single-flight cache with stale-on-failure fallback.
///
/// Cloning is cheap: clones share entries and the runtime.
pub struct BlockingRefreshCache<K, V, E> {
    cache: RefreshCache<K, V, E>,
    runtime: Arc<Runtime>,
}

impl<K, V, E> Clone for BlockingRefreshCache<K, V, E> {
    fn clone(&self) -> Self {
        BlockingRefreshCache {
            cache: self.cache.clone(),
            runtime: Arc::clone(&self.runtime),
        }
    }
}

impl<K: Eq + Hash, V, E> Debug for BlockingRefreshCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingRefreshCache")
            .field("cache", &self.cache)
            .finish()
    }
}

impl<K, V, E> BlockingRefreshCache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty cache with its own runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::Other` if the runtime cannot be started.
    pub fn new() -> Result<Self> {
        Self::with_workers(DEFAULT_WORKERS)
    }

    /// Like [`new`](Self::new), with `workers` runtime threads.
    ///
    /// # Errors
    ///
    /// Returns `Error::Other` if the runtime cannot be started.
    pub fn with_workers(workers: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name("refresh-kit")
            .enable_time()
            .build()
            .map_err(|e| Error::Other(format!("Failed to start refresh runtime: {}", e)))?;
        debug!("Started blocking refresh runtime with {} workers", workers.max(1));

        Ok(BlockingRefreshCache {
            cache: RefreshCache::new(),
            runtime: Arc::new(runtime),
        })
    }

    /// Set custom metrics handler.
    pub fn with_metrics(self, metrics: Box<dyn RefreshMetrics>) -> Self {
        BlockingRefreshCache {
            cache: self.cache.with_metrics(metrics),
            runtime: self.runtime,
        }
    }

    /// Version-hinted lookup; see
    /// [`RefreshCache::get_versioned`](crate::cache::RefreshCache::get_versioned).
    pub fn get_versioned<F>(
        &self,
        key: K,
        seen: Option<Version>,
        producer: F,
    ) -> std::result::Result<Versioned<V>, E>
    where
        F: FnOnce() -> std::result::Result<V, E> + Send + 'static,
    {
        self.runtime
            .block_on(self.cache.get_versioned(key, seen, offload(producer)))
    }

    /// Forget `key`. Idempotent; returns whether an entry was present.
    pub fn remove(&self, key: &K) -> bool {
        self.cache.remove(key)
    }

    /// Last good value for `key` without refreshing.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoValueAvailable` if there is none.
    pub fn cached(&self, key: &K) -> Result<V> {
        self.cache.cached(key)
    }

    pub fn state(&self, key: &K) -> Option<EntryState> {
        self.cache.state(key)
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.cache.is_in_flight(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl<K, V, E> BlockingRefreshCache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Get the value for `key`, blocking until it is available.
    ///
    /// Same hint semantics as
    /// [`RefreshCache::get`](crate::cache::RefreshCache::get). `producer`
    /// runs on the blocking pool, at most once across concurrent callers.
    pub fn get<F>(&self, key: K, hint: Option<&V>, producer: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E> + Send + 'static,
    {
        self.runtime
            .block_on(self.cache.get(key, hint, offload(producer)))
    }
}

/// Adapt a synchronous producer into an async one that runs on the blocking
/// pool. A panic in `producer` is re-raised on the refresh task.
fn offload<F, V, E>(
    producer: F,
) -> impl FnOnce() -> futures::future::BoxFuture<'static, std::result::Result<V, E>> + Send + 'static
where
    F: FnOnce() -> std::result::Result<V, E> + Send + 'static,
    V: Send + 'static,
    E: Send + 'static,
{
    move || {
        Box::pin(async move {
            match tokio::task::spawn_blocking(producer).await {
                Ok(outcome) => outcome,
                Err(join_error) => std::panic::resume_unwind(join_error.into_panic()),
            }
        })
    }
}
