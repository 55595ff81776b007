//! Single-flight TTL cache in front of the allow-from store

use crate::allowlist::AllowFromStore;
use crate::cache::{CacheEntry, Inflight, catch_panic, spawn_shared};
use crate::logging::Timer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_ALLOW_FROM_TTL: Duration = Duration::from_secs(15);
pub const SLACK_CHANNEL_CLASS: &str = "slack";

/// Holds the store's allow-list for one channel class.
///
/// One instance is created at startup and shared by `Arc`. Nothing is
/// fetched until the first `get_allow_from` call.
pub struct AllowFromCache {
    store: Arc<dyn AllowFromStore>,
    channel_class: String,
    ttl: Duration,
    failure_ttl: Duration,
    entry: Arc<Mutex<Option<CacheEntry<Vec<String>>>>>,
}

impl AllowFromCache {
    pub fn new(store: Arc<dyn AllowFromStore>) -> Self {
        Self::with_ttl(store, DEFAULT_ALLOW_FROM_TTL, DEFAULT_ALLOW_FROM_TTL)
    }

    /// `failure_ttl` applies to the empty list cached after a failed read
    pub fn with_ttl(store: Arc<dyn AllowFromStore>, ttl: Duration, failure_ttl: Duration) -> Self {
        tracing::info!(
            ttl_secs = ttl.as_secs(),
            failure_ttl_secs = failure_ttl.as_secs(),
            "Creating allow-from cache"
        );

        Self {
            store,
            channel_class: SLACK_CHANNEL_CLASS.to_string(),
            ttl,
            failure_ttl,
            entry: Arc::new(Mutex::new(None)),
        }
    }

    /// Current store allow-list. A failed read yields an empty list.
    pub async fn get_allow_from(&self) -> Vec<String> {
        let pending = {
            let mut entry = self.entry.lock().await;
            let now = Instant::now();

            let cached = entry
                .as_ref()
                .map(|e| (e.fresh_value(now).cloned(), e.inflight.clone()));

            match cached {
                Some((Some(allow_from), _)) => return allow_from,
                Some((None, Some(inflight))) => {
                    tracing::trace!("Joining in-flight allow-from refresh");
                    inflight
                }
                _ => self.start_refresh(&mut entry, now),
            }
        };

        pending.await
    }

    /// Must be called with the entry lock held.
    fn start_refresh(
        &self,
        entry: &mut Option<CacheEntry<Vec<String>>>,
        now: Instant,
    ) -> Inflight<Vec<String>> {
        let store = Arc::clone(&self.store);
        let shared_entry = Arc::clone(&self.entry);
        let channel_class = self.channel_class.clone();
        let (ttl, failure_ttl) = (self.ttl, self.failure_ttl);

        let inflight = spawn_shared(async move {
            let (allow_from, expires_in) = {
                let _timer = Timer::new("read_allow_list", channel_class.as_str());
                match catch_panic("read_allow_list", store.read_allow_list(&channel_class)).await {
                    Some(Ok(allow_from)) => {
                        tracing::debug!(
                            channel_class = %channel_class,
                            entries = allow_from.len(),
                            "Refreshed allow-from store"
                        );
                        (allow_from, ttl)
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            channel_class = %channel_class,
                            error = %e,
                            "Failed to read allow-from store, using empty list"
                        );
                        (Vec::new(), failure_ttl)
                    }
                    None => (Vec::new(), failure_ttl),
                }
            };

            *shared_entry.lock().await = Some(CacheEntry::ready(
                allow_from.clone(),
                Instant::now() + expires_in,
            ));
            allow_from
        });

        let previous = entry.take().map(|e| e.value).unwrap_or_default();
        *entry = Some(CacheEntry::refreshing(previous, now, inflight.clone()));

        inflight
    }
}
