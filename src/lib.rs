//! # refresh-kit
//!
//! Single-flight value caches for values that are expensive to produce and
//! go stale: routing tables, partition maps, access tokens.
//!
//! ## Features
//!
//! - **Single-flight:** concurrent callers for one key share one producer
//!   invocation, and unrelated keys never wait on each other
//! - **Stale on failure:** a failed refresh serves the last good value when
//!   there is one and the producer's own error when there is not
//! - **Never cancelled:** a started refresh runs to completion even if every
//!   caller goes away or the key is removed
//! - **Two staleness models:** caller-hinted ([`RefreshCache`]) and
//!   expiry-driven with throttling ([`TtlCache`])
//! - **Async and blocking:** [`BlockingRefreshCache`] for threaded callers
//! - **Observable:** `log` output, pluggable [`RefreshMetrics`], [`CacheStats`]
//!
//! ## Quick Start
//!
//! ### Caller-hinted refresh
//!
//! ```
//! use refresh_kit::RefreshCache;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: RefreshCache<&str, u32, String> = RefreshCache::new();
//!
//! // First call produces.
//! let v = cache.get("orders", None, || async { Ok(1) }).await;
//! assert_eq!(v, Ok(1));
//!
//! // Hand the value back as a hint once it is known to be stale.
//! let v = cache.get("orders", Some(&1), || async { Ok(2) }).await;
//! assert_eq!(v, Ok(2));
//!
//! // A failure falls back to the last good value.
//! let v = cache.get("orders", Some(&2), || async { Err("down".to_string()) }).await;
//! assert_eq!(v, Ok(2));
//! # }
//! ```
//!
//! ### Expiring values
//!
//! ```
//! use refresh_kit::{Expiring, RefreshConfig, TtlCache};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let tokens: TtlCache<String, String, String> = TtlCache::new(
//!     |scope: String| async move {
//!         Ok(Expiring::new(format!("{}-token", scope), Duration::from_secs(3600)))
//!     },
//!     RefreshConfig::default(),
//! );
//!
//! assert_eq!(tokens.get("storage".to_string()).await, Ok("storage-token".to_string()));
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod blocking;
pub mod cache;
pub mod config;
pub mod error;
pub mod gate;
pub mod observability;
pub mod policy;
pub mod producer;
pub mod schedule;
pub mod serialization;
pub mod slot;
pub mod strategy;
pub mod ttl;

// Re-exports for convenience
pub use blocking::BlockingRefreshCache;
pub use cache::RefreshCache;
pub use config::RefreshConfig;
pub use error::{Error, Result};
pub use gate::{RefreshGate, Version, Versioned};
pub use observability::{CacheStats, LogMetrics, NoOpMetrics, RefreshMetrics};
pub use policy::EntryState;
pub use producer::Producer;
pub use schedule::Expiring;
pub use serialization::Snapshot;
pub use slot::LazySlot;
pub use strategy::RefreshMode;
pub use ttl::TtlCache;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
