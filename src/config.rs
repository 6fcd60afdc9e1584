//! Configuration for the time-based cache.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lead time before expiry at which a value is refreshed.
pub const DEFAULT_REFRESH_OFFSET: Duration = Duration::from_secs(5 * 60);

/// Default minimum delay between two refresh attempts for one key.
pub const DEFAULT_THROTTLE_DELAY: Duration = Duration::from_secs(30);

/// Timing knobs for [`TtlCache`](crate::ttl::TtlCache).
///
/// Durations are (de)serialized as milliseconds:
///
/// ```
/// use refresh_kit::config::RefreshConfig;
/// use std::time::Duration;
///
/// let config = RefreshConfig::from_json(r#"{ "throttle_delay_ms": 1500 }"#).unwrap();
/// assert_eq!(config.throttle_delay, Duration::from_millis(1500));
/// assert_eq!(config.refresh_offset, Duration::from_secs(300));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Refresh once a value is this close to expiring.
    #[serde(rename = "refresh_offset_ms", with = "millis")]
    pub refresh_offset: Duration,

    /// After any refresh attempt, wait at least this long before the next.
    #[serde(rename = "throttle_delay_ms", with = "millis")]
    pub throttle_delay: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            refresh_offset: DEFAULT_REFRESH_OFFSET,
            throttle_delay: DEFAULT_THROTTLE_DELAY,
        }
    }
}

impl RefreshConfig {
    /// Override the proactive refresh offset.
    pub fn with_refresh_offset(mut self, offset: Duration) -> Self {
        self.refresh_offset = offset;
        self
    }

    /// Override the throttle delay.
    pub fn with_throttle_delay(mut self, delay: Duration) -> Self {
        self.throttle_delay = delay;
        self
    }

    /// Parse a JSON document. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
