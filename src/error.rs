//! Error types for the refresh caches.
//!
//! Producer failures are never represented here: they are the caller's own
//! error type `E` and travel through the caches untouched. This enum only
//! covers what the crate itself can get wrong (snapshots, configuration,
//! peeking at an empty key).

use std::fmt;

/// Result type for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Serialization failed when encoding a snapshot.
    SerializationError(String),

    /// Deserialization failed when decoding a snapshot.
    ///
    /// Common causes:
    /// - Truncated bytes read from disk
    /// - Payload written for a different key/value type
    DeserializationError(String),

    /// Snapshot envelope did not start with the expected magic.
    ///
    /// **Recovery:** Discard the snapshot and start with an empty cache.
    InvalidSnapshot(String),

    /// Snapshot schema version does not match the running code.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from the snapshot)
        found: u32,
    },

    /// Invalid configuration.
    ConfigError(String),

    /// No successfully produced value exists for the key.
    ///
    /// Returned by non-refreshing reads such as `RefreshCache::cached`.
    NoValueAvailable,

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidSnapshot(msg) => write!(f, "Invalid snapshot: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Snapshot version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::NoValueAvailable => write!(f, "No value available"),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::ConfigError(e.to_string())
        } else {
            Error::Other(e.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
