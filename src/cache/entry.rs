use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::time::Instant;

/// A refresh in progress, awaitable by any number of callers
pub type Inflight<V> = Shared<BoxFuture<'static, V>>;

/// One cached value with its expiry and, while refreshing, the pending result
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
    pub inflight: Option<Inflight<V>>,
}

impl<V: Clone> CacheEntry<V> {
    /// A settled entry, fresh until `expires_at`
    pub fn ready(value: V, expires_at: Instant) -> Self {
        Self {
            value,
            expires_at,
            inflight: None,
        }
    }

    /// An entry being refreshed. It expires immediately so that readers fall
    /// through to the in-flight future.
    pub fn refreshing(value: V, now: Instant, inflight: Inflight<V>) -> Self {
        Self {
            value,
            expires_at: now,
            inflight: Some(inflight),
        }
    }

    /// The cached value, if it has not expired at `now`
    pub fn fresh_value(&self, now: Instant) -> Option<&V> {
        (now < self.expires_at).then_some(&self.value)
    }
}

/// Await a remote call, turning a panic into `None`.
///
/// Refresh tasks wrap their remote call in this so the entry write-back that
/// follows still runs and the entry expires normally.
pub async fn catch_panic<F: Future>(operation: &'static str, call: F) -> Option<F::Output> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(output) => Some(output),
        Err(_) => {
            tracing::warn!(operation = operation, "Remote call panicked");
            None
        }
    }
}

/// Run `task` on the runtime and return a shareable handle to its output.
///
/// The task runs to completion even if every awaiting caller is dropped. A
/// task that dies before settling (runtime shutdown) resolves to `V::default()`.
pub fn spawn_shared<V, F>(task: F) -> Inflight<V>
where
    V: Clone + Default + Send + Sync + 'static,
    F: Future<Output = V> + Send + 'static,
{
    let handle = tokio::spawn(task);
    async move {
        handle.await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Cache refresh task failed");
            V::default()
        })
    }
    .boxed()
    .shared()
}
