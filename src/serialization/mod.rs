//! Snapshot export/import with versioned envelopes.
//!
//! A snapshot is the `{key -> last good value}` map of a
//! [`RefreshCache`](crate::cache::RefreshCache). In-flight refreshes are not
//! part of it: a restored cache starts with nothing pending.
//!
//! # Format
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "RKIT"              u32                postcard(HashMap<K, V>)
//! ```
//!
//! # Example
//!
//! ```rust
//! use refresh_kit::serialization::Snapshot;
//!
//! # fn main() -> refresh_kit::Result<()> {
//! let snapshot = Snapshot::from_entries(vec![("eu-west".to_string(), 3u32)]);
//! let bytes = snapshot.to_bytes()?;
//!
//! let restored: Snapshot<String, u32> = Snapshot::from_bytes(&bytes)?;
//! assert_eq!(restored.get(&"eu-west".to_string()), Some(&3));
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// Magic header for snapshot envelopes: b"RKIT"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"RKIT";

/// Current snapshot schema version.
///
/// Bump when the envelope layout changes. Changes to the cached value types
/// themselves are the caller's business.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around an encoded payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SnapshotEnvelope<T> {
    /// Magic header: must be b"RKIT"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    pub payload: T,
}

impl<T> SnapshotEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    magic: [u8; 4],
    version: u32,
}

/// Encode `value` inside an envelope.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = SnapshotEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        log::error!("Snapshot serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode an envelope produced by [`encode`].
///
/// The header is validated before the payload is touched.
///
/// # Errors
///
/// - `Error::InvalidSnapshot`: bad magic or truncated header
/// - `Error::VersionMismatch`: schema version mismatch
/// - `Error::DeserializationError`: corrupted payload
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (header, payload) = postcard::take_from_bytes::<EnvelopeHeader>(bytes)
        .map_err(|e| Error::InvalidSnapshot(format!("Unreadable header: {}", e)))?;

    if header.magic != SNAPSHOT_MAGIC {
        log::warn!(
            "Invalid snapshot: expected magic {:?}, got {:?}",
            SNAPSHOT_MAGIC,
            header.magic
        );
        return Err(Error::InvalidSnapshot(format!(
            "Invalid magic: expected {:?}, got {:?}",
            SNAPSHOT_MAGIC, header.magic
        )));
    }

    if header.version != CURRENT_SCHEMA_VERSION {
        log::warn!(
            "Snapshot version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION,
            header.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: header.version,
        });
    }

    postcard::from_bytes(payload).map_err(|e| {
        log::error!("Snapshot deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })
}

/// Exported `{key -> last good value}` map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot<K: Eq + Hash, V> {
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash, V> Default for Snapshot<K, V> {
    fn default() -> Self {
        Snapshot {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> Snapshot<K, V> {
    pub fn from_entries<I: IntoIterator<Item = (K, V)>>(entries: I) -> Self {
        Snapshot {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> HashMap<K, V> {
        self.entries
    }
}

impl<K, V> Snapshot<K, V>
where
    K: Eq + Hash + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Encode for persistence.
    ///
    /// # Errors
    ///
    /// Returns `Error::SerializationError` if a key or value fails to encode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&self.entries)
    }

    /// Decode bytes written by [`Snapshot::to_bytes`].
    ///
    /// # Errors
    ///
    /// See [`decode`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes).map(|entries| Snapshot { entries })
    }
}
