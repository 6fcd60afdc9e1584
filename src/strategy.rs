//! Per-call refresh modes for the time-based cache.
//!
//! | Mode | Fresh value | Inside refresh window | Expired / missing |
//! |------|-------------|-----------------------|-------------------|
//! | **Auto** | Serve | Refresh unless throttled, fall back to cached | Refresh, no fallback |
//! | **Force** | Refresh, fall back to cached | Refresh, fall back to cached | Refresh, no fallback |
//!
//! `Force` ignores the throttle but still resets it afterwards.

/// How a single `get` on a `TtlCache` treats the cached value.
///
/// # Examples
///
/// ```
/// use refresh_kit::strategy::RefreshMode;
///
/// // Let the scheduler decide (default)
/// let _mode = RefreshMode::Auto;
///
/// // Caller knows the credential was revoked
/// let _mode = RefreshMode::Force;
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Serve cached values while fresh, refresh proactively near expiry.
    #[default]
    Auto,

    /// Refresh now, bypassing the throttle.
    Force,
}

impl std::fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshMode::Auto => write!(f, "Auto"),
            RefreshMode::Force => write!(f, "Force"),
        }
    }
}
