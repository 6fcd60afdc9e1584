//! Stale-on-failure decision logic.
//!
//! When a refresh finishes, its outcome is turned into a [`Resolution`]
//! before anyone sees it. Rules, in order:
//!
//! 1. Success: the new value becomes the entry's last good value and goes
//!    to every observer.
//! 2. Failure with a last good value: the entry keeps that value, is marked
//!    `Failed`, and every observer receives the old value. The error is
//!    swallowed but counted.
//! 3. Failure without a last good value: the error goes to every observer
//!    unchanged and the entry drops back to `Empty`, so the next call simply
//!    tries again.
//!
//! Nothing here retries. Another attempt only happens when a caller asks
//! for one.

use crate::gate::{CacheEntry, Versioned};

/// Lifecycle state of a cache entry.
///
/// ```text
/// Empty ──► Pending ──► Ready
///             ▲  │
///             │  └────► Failed ──► Pending (retry)
///             └── Ready (staleness detected)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// No refresh has succeeded since the entry was created.
    Empty,
    /// A refresh is in flight.
    Pending,
    /// The last refresh succeeded.
    Ready,
    /// The last refresh failed while an older value was still held.
    Failed,
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryState::Empty => write!(f, "Empty"),
            EntryState::Pending => write!(f, "Pending"),
            EntryState::Ready => write!(f, "Ready"),
            EntryState::Failed => write!(f, "Failed"),
        }
    }
}

/// What a finished refresh means for its observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution<V, E> {
    /// The producer succeeded.
    Refreshed(V),
    /// The producer failed; the previous value is served instead.
    StaleServed {
        /// Last good value handed to the observers.
        value: V,
        /// The swallowed producer error.
        error: E,
    },
    /// The producer failed and there was nothing to fall back to.
    Propagated(E),
}

impl<V, E> Resolution<V, E> {
    /// Classify a producer outcome given the fallback available to it.
    pub fn resolve(outcome: Result<V, E>, fallback: Option<V>) -> Self {
        match (outcome, fallback) {
            (Ok(value), _) => Resolution::Refreshed(value),
            (Err(error), Some(value)) => Resolution::StaleServed { value, error },
            (Err(error), None) => Resolution::Propagated(error),
        }
    }

    /// The value observers receive, if any.
    pub fn value(&self) -> Option<&V> {
        match self {
            Resolution::Refreshed(value) | Resolution::StaleServed { value, .. } => Some(value),
            Resolution::Propagated(_) => None,
        }
    }

    /// Whether a failure was hidden behind an older value.
    pub fn is_stale(&self) -> bool {
        matches!(self, Resolution::StaleServed { .. })
    }

    /// Collapse into what the caller of `get` sees.
    pub fn into_result(self) -> Result<V, E> {
        match self {
            Resolution::Refreshed(value) | Resolution::StaleServed { value, .. } => Ok(value),
            Resolution::Propagated(error) => Err(error),
        }
    }
}

impl<V: Clone, E> CacheEntry<V, E> {
    /// Fold a finished refresh into the entry and return its new state.
    ///
    /// A failure never touches `last_good`.
    pub(crate) fn apply(&mut self, resolution: &Resolution<Versioned<V>, E>) -> EntryState {
        self.state = match resolution {
            Resolution::Refreshed(fresh) => {
                self.last_good = Some(fresh.clone());
                self.failures = 0;
                EntryState::Ready
            }
            Resolution::StaleServed { .. } => {
                self.failures = self.failures.saturating_add(1);
                EntryState::Failed
            }
            Resolution::Propagated(_) if self.last_good.is_some() => {
                // An expired value may still be held; it was just not usable
                // as a fallback for this attempt.
                self.failures = self.failures.saturating_add(1);
                EntryState::Failed
            }
            Resolution::Propagated(_) => {
                self.failures = 0;
                EntryState::Empty
            }
        };
        self.state
    }
}
