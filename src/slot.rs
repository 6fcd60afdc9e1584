//! Per-key memoization cell.
//!
//! A [`LazySlot`] wraps exactly one asynchronous computation. Any number of
//! observers may await it; the producer runs once and every observer sees
//! the same outcome, success or failure. Observers that arrive after the
//! computation resolved get the stored outcome immediately.
//!
//! The slot is lazy: nothing runs until the first observer polls it or
//! somebody calls [`LazySlot::spawn`]. The refresh gate spawns every slot it
//! creates so that a started refresh finishes even if all callers go away.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;

/// Future handed to observers of a [`LazySlot`].
pub type SlotFuture<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// Single asynchronous computation shared by many observers.
///
/// # Example
///
/// ```
/// use refresh_kit::slot::LazySlot;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let slot: LazySlot<u32, String> = LazySlot::new(|| async { Ok(42) });
///
/// let (a, b) = tokio::join!(slot.value(), slot.value());
/// assert_eq!(a, Ok(42));
/// assert_eq!(b, Ok(42));
/// # }
/// ```
pub struct LazySlot<V, E> {
    shared: SlotFuture<V, E>,
}

impl<V, E> Clone for LazySlot<V, E> {
    fn clone(&self) -> Self {
        LazySlot {
            shared: self.shared.clone(),
        }
    }
}

impl<V, E> LazySlot<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap `producer`. The producer is not invoked until the slot is observed.
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        Self::from_future(async move { producer().await })
    }

    /// Wrap an already constructed (but not yet polled) future.
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        LazySlot {
            shared: future.boxed().shared(),
        }
    }

    /// A handle resolving to the slot's single outcome.
    pub fn value(&self) -> SlotFuture<V, E> {
        self.shared.clone()
    }

    /// The outcome, if the computation already finished.
    pub fn peek(&self) -> Option<&Result<V, E>> {
        self.shared.peek()
    }

    /// Whether the computation finished.
    pub fn is_resolved(&self) -> bool {
        self.peek().is_some()
    }

    /// Drive the computation to completion on the current Tokio runtime,
    /// independently of whether anyone is still observing it.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let driver = self.value();
        tokio::spawn(async move {
            driver.await.ok();
        })
    }
}

impl<V, E> fmt::Debug for LazySlot<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySlot")
            .field("observers", &self.shared.strong_count())
            .finish()
    }
}
