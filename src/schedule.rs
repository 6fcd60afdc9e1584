//! Expiry-driven refresh scheduling.
//!
//! The time-based cache has no caller hint to tell it a value went stale;
//! instead every value carries an expiry and the [`ExpiryScheduler`] decides
//! from the clock:
//!
//! - nothing cached, or the cached value expired: refresh, and a failure
//!   reaches the caller;
//! - a refresh attempt ended less than `throttle_delay` ago: serve;
//! - the value expires within `refresh_offset`: refresh, falling back to the
//!   cached value if the producer fails;
//! - otherwise: serve.
//!
//! An expired value is never served, even while throttled.

use crate::config::RefreshConfig;
use crate::strategy::RefreshMode;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// A value with an optional expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expiring<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Expiring<V> {
    /// Expires `ttl` from now.
    ///
    /// A `ttl` too large to represent as a deadline never expires.
    pub fn new(value: V, ttl: Duration) -> Self {
        match Instant::now().checked_add(ttl) {
            Some(deadline) => Self::at(value, deadline),
            None => Self::never(value),
        }
    }

    /// Expires at `deadline`.
    pub fn at(value: V, deadline: Instant) -> Self {
        Expiring {
            value,
            expires_at: Some(deadline),
        }
    }

    /// Never expires.
    pub fn never(value: V) -> Self {
        Expiring {
            value,
            expires_at: None,
        }
    }

    /// Expires at a wall-clock time, as credentials usually declare.
    ///
    /// The deadline is mapped onto the monotonic clock once, here; a time in
    /// the past yields an already-expired value.
    pub fn from_system_time(value: V, expires_at: SystemTime) -> Self {
        let remaining = expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        Self::new(value, remaining)
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Whether the value is expired at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Whether the value is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time left before expiry, `None` for values that never expire.
    pub fn time_to_expiry(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

/// Scheduler verdict for one `get`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// Serve the cached value as is.
    Serve,
    /// Start a refresh. With `fallback`, a failed refresh serves the
    /// cached value instead of the error.
    Refresh { fallback: bool },
}

/// Decides when time-bound values are refreshed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiryScheduler {
    refresh_offset: Duration,
    throttle_delay: Duration,
}

impl Default for ExpiryScheduler {
    fn default() -> Self {
        Self::new(&RefreshConfig::default())
    }
}

impl ExpiryScheduler {
    pub fn new(config: &RefreshConfig) -> Self {
        ExpiryScheduler {
            refresh_offset: config.refresh_offset,
            throttle_delay: config.throttle_delay,
        }
    }

    pub fn refresh_offset(&self) -> Duration {
        self.refresh_offset
    }

    pub fn throttle_delay(&self) -> Duration {
        self.throttle_delay
    }

    /// Whether `cached` is inside the proactive refresh window at `now`.
    pub fn in_refresh_window<V>(&self, cached: &Expiring<V>, now: Instant) -> bool {
        cached
            .time_to_expiry(now)
            .is_some_and(|left| left <= self.refresh_offset)
    }

    /// Decide what a `get` at `now` should do.
    pub fn schedule<V>(
        &self,
        cached: Option<&Expiring<V>>,
        not_before: Option<Instant>,
        now: Instant,
        mode: RefreshMode,
    ) -> Schedule {
        let Some(cached) = cached else {
            return Schedule::Refresh { fallback: false };
        };
        if cached.is_expired_at(now) {
            return Schedule::Refresh { fallback: false };
        }
        if mode == RefreshMode::Force {
            return Schedule::Refresh { fallback: true };
        }
        if not_before.is_some_and(|not_before| now < not_before) {
            return Schedule::Serve;
        }
        if self.in_refresh_window(cached, now) {
            Schedule::Refresh { fallback: true }
        } else {
            Schedule::Serve
        }
    }
}
