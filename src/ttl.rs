//! Time-based refresh cache.
//!
//! [`TtlCache`] is for values that declare their own expiry, such as access
//! tokens. The producer is bound when the cache is created and invoked by
//! key. Values are refreshed proactively once they enter the refresh window
//! (`refresh_offset` before expiry) and never more than once per
//! `throttle_delay`, however many callers ask. A failed proactive refresh
//! keeps serving the cached value until it actually expires.
//!
//! ```ignore
//! use refresh_kit::{Expiring, RefreshConfig, TtlCache};
//!
//! let tokens = TtlCache::new(
//!     move |scope: String| {
//!         let client = client.clone();
//!         async move {
//!             let token = client.acquire(&scope).await?;
//!             Ok(Expiring::new(token.secret, token.lifetime))
//!         }
//!     },
//!     RefreshConfig::default(),
//! );
//!
//! let secret = tokens.get("storage".to_string()).await?;
//! ```

use crate::config::RefreshConfig;
use crate::error::{Error, Result};
use crate::gate::{Decision, RefreshGate, RefreshPlan};
use crate::observability::{CacheStats, RefreshMetrics};
use crate::policy::EntryState;
use crate::producer::Producer;
use crate::schedule::{Expiring, ExpiryScheduler, Schedule};
use crate::strategy::RefreshMode;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;
use tokio::time::Instant;

/// Single-flight cache of expiring values with proactive, throttled refresh.
///
/// Cloning is cheap: clones share entries and the producer.
pub struct TtlCache<K, V, E> {
    gate: RefreshGate<K, Expiring<V>, E>,
    producer: Arc<dyn Producer<K, V, E>>,
    scheduler: ExpiryScheduler,
}

impl<K, V, E> Clone for TtlCache<K, V, E> {
    fn clone(&self) -> Self {
        TtlCache {
            gate: self.gate.clone(),
            producer: Arc::clone(&self.producer),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<K: Eq + Hash, V, E> Debug for TtlCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("gate", &self.gate)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl<K, V, E> TtlCache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty cache around `producer`.
    pub fn new<P>(producer: P, config: RefreshConfig) -> Self
    where
        P: Producer<K, V, E> + 'static,
    {
        debug!(
            "Creating TtlCache (refresh offset {:?}, throttle {:?})",
            config.refresh_offset, config.throttle_delay
        );
        TtlCache {
            gate: RefreshGate::new(),
            producer: Arc::new(producer),
            scheduler: ExpiryScheduler::new(&config),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(self, metrics: Box<dyn RefreshMetrics>) -> Self {
        TtlCache {
            gate: self.gate.with_metrics(metrics),
            ..self
        }
    }

    /// Get the value for `key`, refreshing as the schedule requires.
    pub async fn get(&self, key: K) -> std::result::Result<V, E> {
        self.get_with(key, RefreshMode::Auto).await
    }

    /// Get the value for `key` under an explicit [`RefreshMode`].
    ///
    /// [`RefreshMode::Force`] starts a refresh even when the value is fresh
    /// or the key is throttled, and still resets the throttle afterwards.
    /// It joins a refresh already in flight rather than starting a second.
    pub async fn get_with(&self, key: K, mode: RefreshMode) -> std::result::Result<V, E> {
        self.get_expiring(key, mode)
            .await
            .map(Expiring::into_value)
    }

    /// Like [`get_with`](Self::get_with), but keeps the expiry attached.
    pub async fn get_expiring(
        &self,
        key: K,
        mode: RefreshMode,
    ) -> std::result::Result<Expiring<V>, E> {
        let scheduler = &self.scheduler;
        let producer = Arc::clone(&self.producer);
        let produce_key = key.clone();

        self.gate
            .get_with(
                key,
                |view| {
                    let cached = view.last_good;
                    let schedule = scheduler.schedule(
                        cached.map(|good| &good.value),
                        view.next_refresh_not_before,
                        Instant::now(),
                        mode,
                    );
                    let plan = match (schedule, cached) {
                        (Schedule::Serve, Some(good)) => return Decision::Serve(good.clone()),
                        (Schedule::Refresh { fallback: true }, good) => {
                            RefreshPlan::with_fallback(good.cloned())
                        }
                        _ => RefreshPlan::without_fallback(),
                    };
                    Decision::Refresh(
                        plan.fallback_while(|token| !token.is_expired())
                            .throttle(scheduler.throttle_delay()),
                    )
                },
                move || producer.produce(produce_key),
            )
            .await
            .map(|fresh| fresh.value)
    }

    /// Forget `key`. Idempotent; returns whether an entry was present.
    pub fn remove(&self, key: &K) -> bool {
        self.gate.remove(key)
    }

    /// Cached value for `key` without refreshing.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoValueAvailable` if nothing is cached for `key` or
    /// the cached value has expired.
    pub fn cached(&self, key: &K) -> Result<V> {
        self.gate
            .last_good(key)
            .map(|good| good.value)
            .filter(|token| !token.is_expired())
            .map(Expiring::into_value)
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

    pub fn scheduler(&self) -> &ExpiryScheduler {
        &self.scheduler
    }
}
