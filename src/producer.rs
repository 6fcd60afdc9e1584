//! Producer abstraction for caches that bind their producer at creation.
//!
//! The producer is whatever actually fetches a value: a token endpoint, a
//! metadata service, a routing table lookup. The cache never looks inside
//! its errors.
//!
//! Any `Fn(K) -> impl Future<Output = Result<Expiring<V>, E>>` closure is a
//! producer:
//!
//! ```ignore
//! let cache = TtlCache::new(
//!     move |scope: String| {
//!         let client = client.clone();
//!         async move {
//!             let token = client.fetch_token(&scope).await?;
//!             Ok(Expiring::from_system_time(token.secret, token.expires_on))
//!         }
//!     },
//!     RefreshConfig::default(),
//! );
//! ```
//!
//! Implement the trait directly when the producer is a named type with
//! state of its own.

use crate::schedule::Expiring;
use futures::future::BoxFuture;
use std::future::Future;

/// Source of time-bound values, invoked by `TtlCache` on refresh.
pub trait Producer<K, V, E>: Send + Sync {
    /// Produce a fresh value for `key`.
    ///
    /// The returned future is spawned, so it must own everything it uses.
    fn produce(&self, key: K) -> BoxFuture<'static, Result<Expiring<V>, E>>;
}

impl<K, V, E, F, Fut> Producer<K, V, E> for F
where
    F: Fn(K) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Expiring<V>, E>> + Send + 'static,
{
    fn produce(&self, key: K) -> BoxFuture<'static, Result<Expiring<V>, E>> {
        Box::pin(self(key))
    }
}
