//! Single-flight refresh coordinator.
//!
//! [`RefreshGate`] owns the entry map. For every `get` it either serves the
//! cached value, attaches the caller to the refresh already in flight for
//! that key, or installs a new [`LazySlot`] and spawns it. Which of the first
//! and third happens is up to a caller-supplied decision closure, so the
//! hint-driven and the time-based caches share this one code path.
//!
//! # Concurrency
//!
//! The map is a [`DashMap`]: checking for an in-flight refresh and
//! installing a new one happens under that key's shard lock, so at most one
//! refresh per key exists at any instant and unrelated keys never wait on
//! each other. The lock is never held across an `.await`.
//!
//! A refresh, once started, always runs to completion on its own Tokio task.
//! [`RefreshGate::remove`] forgets the entry but does not cancel the task;
//! the orphaned refresh still resolves its observers but never writes into
//! the map again.

use crate::observability::{CacheStats, Counters, NoOpMetrics, RefreshMetrics};
use crate::policy::{EntryState, Resolution};
use crate::slot::{LazySlot, SlotFuture};
use dashmap::DashMap;
use futures::FutureExt;
use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Monotonic version assigned to every successfully produced value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    pub(crate) fn new(version: u64) -> Self {
        Version(version)
    }

    /// Raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value together with the version it was published under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<V> {
    pub value: V,
    pub version: Version,
}

/// Read-only view of an entry handed to decision closures.
#[derive(Debug)]
pub struct EntryView<'a, V> {
    pub state: EntryState,
    pub last_good: Option<&'a Versioned<V>>,
    /// Failed refreshes since the last success.
    pub failures: u32,
    /// Earliest instant a new refresh may start, if throttled.
    pub next_refresh_not_before: Option<Instant>,
}

/// Outcome of a decision closure.
#[derive(Debug)]
pub enum Decision<V> {
    /// Return this value without touching the producer.
    Serve(Versioned<V>),
    /// Start a refresh.
    Refresh(RefreshPlan<V>),
}

/// How a refresh treats failure and throttling.
pub struct RefreshPlan<V> {
    fallback: Option<Versioned<V>>,
    fallback_valid: Option<fn(&V) -> bool>,
    throttle: Option<Duration>,
}

impl<V> RefreshPlan<V> {
    /// Refresh with nothing to fall back to: failures reach the caller.
    pub fn without_fallback() -> Self {
        RefreshPlan {
            fallback: None,
            fallback_valid: None,
            throttle: None,
        }
    }

    /// Refresh, serving `fallback` if the producer fails.
    pub fn with_fallback(fallback: Option<Versioned<V>>) -> Self {
        RefreshPlan {
            fallback,
            ..Self::without_fallback()
        }
    }

    /// Only use the fallback if `valid` still holds once the producer failed.
    pub fn fallback_while(mut self, valid: fn(&V) -> bool) -> Self {
        self.fallback_valid = Some(valid);
        self
    }

    /// Block further refreshes of the key for `delay` after this one ends.
    pub fn throttle(mut self, delay: Duration) -> Self {
        self.throttle = Some(delay);
        self
    }
}

impl<V> Debug for RefreshPlan<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshPlan")
            .field("fallback", &self.fallback.as_ref().map(|v| v.version))
            .field("fallback_valid", &self.fallback_valid.is_some())
            .field("throttle", &self.throttle)
            .finish()
    }
}

pub(crate) struct InFlight<V, E> {
    id: u64,
    slot: LazySlot<Versioned<V>, E>,
}

/// Map entry for one key.
pub(crate) struct CacheEntry<V, E> {
    /// Identity of this entry; a key re-created after `remove` gets a new one.
    pub(crate) id: u64,
    pub(crate) state: EntryState,
    /// Present only while `state == Pending`.
    pub(crate) in_flight: Option<InFlight<V, E>>,
    pub(crate) last_good: Option<Versioned<V>>,
    pub(crate) failures: u32,
    pub(crate) next_refresh_not_before: Option<Instant>,
}

impl<V, E> CacheEntry<V, E> {
    pub(crate) fn new(id: u64) -> Self {
        CacheEntry {
            id,
            state: EntryState::Empty,
            in_flight: None,
            last_good: None,
            failures: 0,
            next_refresh_not_before: None,
        }
    }

    fn view(&self) -> EntryView<'_, V> {
        EntryView {
            state: self.state,
            last_good: self.last_good.as_ref(),
            failures: self.failures,
            next_refresh_not_before: self.next_refresh_not_before,
        }
    }

    fn owns_flight(&self, entry_id: u64, flight_id: u64) -> bool {
        self.id == entry_id && self.in_flight.as_ref().is_some_and(|f| f.id == flight_id)
    }
}

enum Ticket<V, E> {
    Serve(Versioned<V>),
    Join(SlotFuture<Versioned<V>, E>),
    Start(LazySlot<Versioned<V>, E>),
}

struct GateInner<K, V, E> {
    entries: DashMap<K, CacheEntry<V, E>>,
    ids: AtomicU64,
    versions: AtomicU64,
    counters: Counters,
    metrics: Box<dyn RefreshMetrics>,
}

/// Single-flight coordinator over a map of refreshable entries.
///
/// Cloning is cheap and every clone shares the same entries.
///
/// Must be used from within a Tokio runtime: refreshes are spawned.
pub struct RefreshGate<K, V, E> {
    inner: Arc<GateInner<K, V, E>>,
}

impl<K, V, E> Clone for RefreshGate<K, V, E> {
    fn clone(&self) -> Self {
        RefreshGate {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Eq + Hash, V, E> Debug for RefreshGate<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshGate")
            .field("entries", &self.inner.entries.len())
            .finish()
    }
}

impl<K, V, E> Default for RefreshGate<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> RefreshGate<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty gate.
    pub fn new() -> Self {
        RefreshGate {
            inner: Arc::new(GateInner {
                entries: DashMap::new(),
                ids: AtomicU64::new(1),
                versions: AtomicU64::new(1),
                counters: Counters::default(),
                metrics: Box::new(NoOpMetrics),
            }),
        }
    }

    /// Set custom metrics handler.
    ///
    /// Only takes effect before the gate is cloned.
    pub fn with_metrics(mut self, metrics: Box<dyn RefreshMetrics>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.metrics = metrics,
            None => warn!("with_metrics called on a shared RefreshGate; metrics unchanged"),
        }
        self
    }

    /// Look up `key` and either serve, join, or refresh.
    ///
    /// `decide` runs under the key's lock and only when no refresh is in
    /// flight; it must not block. `producer` is invoked only if `decide`
    /// returns [`Decision::Refresh`].
    pub async fn get_with<D, F, Fut>(
        &self,
        key: K,
        decide: D,
        producer: F,
    ) -> Result<Versioned<V>, E>
    where
        D: FnOnce(&EntryView<'_, V>) -> Decision<V>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let ticket = {
            let mut entry = self
                .inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(self.inner.next_id()));

            let joined = entry.in_flight.as_ref().map(|flight| flight.slot.value());
            if let Some(pending) = joined {
                Ticket::Join(pending)
            } else {
                let decision = decide(&entry.view());
                match decision {
                    Decision::Serve(value) => Ticket::Serve(value),
                    Decision::Refresh(plan) => {
                        let flight = self.inner.launch(key.clone(), entry.id, plan, producer);
                        let slot = flight.slot.clone();
                        entry.state = EntryState::Pending;
                        entry.in_flight = Some(flight);
                        Ticket::Start(slot)
                    }
                }
            }
        };

        match ticket {
            Ticket::Serve(value) => {
                self.inner.counters.hit();
                self.inner.metrics.record_hit(&key);
                Ok(value)
            }
            Ticket::Join(pending) => {
                self.inner.counters.join();
                self.inner.metrics.record_join(&key);
                pending.await
            }
            Ticket::Start(slot) => {
                slot.spawn();
                slot.value().await
            }
        }
    }

    /// Forget `key`. Returns whether an entry was present.
    ///
    /// An in-flight refresh is not cancelled; its result just never lands
    /// in the map, so the next `get` starts from scratch.
    pub fn remove(&self, key: &K) -> bool {
        match self.inner.entries.remove(key) {
            Some((key, entry)) => {
                if entry.in_flight.is_some() {
                    warn!("Evicted {:?} while a refresh was in flight", key);
                }
                self.inner.counters.eviction();
                self.inner.metrics.record_evict(&key);
                true
            }
            None => false,
        }
    }

    /// Install `value` as the last good value for `key` unless a refresh is
    /// in flight for it. Returns whether the value was installed.
    pub fn seed(&self, key: K, value: V) -> bool {
        let mut entry = self
            .inner
            .entries
            .entry(key)
            .or_insert_with(|| CacheEntry::new(self.inner.next_id()));
        if entry.in_flight.is_some() {
            return false;
        }
        entry.last_good = Some(Versioned {
            value,
            version: self.inner.next_version(),
        });
        entry.state = EntryState::Ready;
        entry.failures = 0;
        true
    }

    /// Last successfully produced value for `key`, without refreshing.
    pub fn last_good(&self, key: &K) -> Option<Versioned<V>> {
        self.inner
            .entries
            .get(key)
            .and_then(|entry| entry.last_good.clone())
    }

    /// Current lifecycle state of `key`, `None` if absent.
    pub fn state(&self, key: &K) -> Option<EntryState> {
        self.inner.entries.get(key).map(|entry| entry.state)
    }

    /// Whether a refresh is currently running for `key`.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inner
            .entries
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Every key with a last good value, paired with that value.
    pub fn last_good_values(&self) -> Vec<(K, V)> {
        self.inner
            .entries
            .iter()
            .filter_map(|entry| {
                entry
                    .last_good
                    .as_ref()
                    .map(|good| (entry.key().clone(), good.value.clone()))
            })
            .collect()
    }

    /// Number of keys in the map.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        let in_flight = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.in_flight.is_some())
            .count();
        self.inner
            .counters
            .snapshot(self.inner.entries.len(), in_flight)
    }
}

impl<K, V, E> GateInner<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    fn next_version(&self) -> Version {
        Version::new(self.versions.fetch_add(1, Ordering::Relaxed))
    }

    /// Build the slot for a new refresh. The caller installs and spawns it.
    fn launch<F, Fut>(
        self: &Arc<Self>,
        key: K,
        entry_id: u64,
        plan: RefreshPlan<V>,
        producer: F,
    ) -> InFlight<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let flight_id = self.next_id();
        let inner = Arc::clone(self);
        self.counters.refresh();
        debug!(
            "» Refresh START for {:?} (fallback: {})",
            key,
            plan.fallback.is_some()
        );

        let slot = LazySlot::from_future(async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(async move { producer().await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(result) => inner.publish(&key, entry_id, flight_id, result, plan, started),
                Err(panic) => {
                    inner.abandon(&key, entry_id, flight_id);
                    std::panic::resume_unwind(panic)
                }
            }
        });

        InFlight {
            id: flight_id,
            slot,
        }
    }

    /// Apply the fallback policy and publish into the entry, if it is
    /// still the one this refresh was started for.
    fn publish(
        &self,
        key: &K,
        entry_id: u64,
        flight_id: u64,
        outcome: Result<V, E>,
        plan: RefreshPlan<V>,
        started: Instant,
    ) -> Result<Versioned<V>, E> {
        let RefreshPlan {
            fallback,
            fallback_valid,
            throttle,
        } = plan;
        let fallback =
            fallback.filter(|last| fallback_valid.map_or(true, |valid| valid(&last.value)));
        let outcome = outcome.map(|value| Versioned {
            value,
            version: self.next_version(),
        });
        let resolution = Resolution::resolve(outcome, fallback);

        let mut failures = 0;
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.owns_flight(entry_id, flight_id) => {
                entry.in_flight = None;
                entry.apply(&resolution);
                if let Some(delay) = throttle {
                    entry.next_refresh_not_before = Some(Instant::now() + delay);
                }
                failures = entry.failures;
            }
            _ => debug!(
                "Refresh for {:?} finished after eviction; outcome not published",
                key
            ),
        }

        match &resolution {
            Resolution::Refreshed(fresh) => {
                self.metrics.record_refresh(key, started.elapsed());
                info!(
                    "✓ Refresh for {:?} published {} in {:?}",
                    key,
                    fresh.version,
                    started.elapsed()
                );
            }
            Resolution::StaleServed { .. } => {
                self.counters.stale_served();
                self.metrics.record_stale_served(key, failures);
            }
            Resolution::Propagated(_) => {
                self.counters.failure();
                self.metrics.record_failure(key);
            }
        }

        resolution.into_result()
    }

    /// Clear the flight after the producer panicked so the key is not stuck.
    fn abandon(&self, key: &K, entry_id: u64, flight_id: u64) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.owns_flight(entry_id, flight_id) {
                entry.in_flight = None;
                entry.state = if entry.last_good.is_some() {
                    EntryState::Failed
                } else {
                    EntryState::Empty
                };
            }
        }
        error!("Producer for {:?} panicked; refresh abandoned", key);
    }
}
