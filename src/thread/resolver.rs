use crate::cache::{CacheEntry, Inflight, catch_panic, spawn_shared};
use crate::logging::Timer;
use crate::slack::{InboundMessage, MessageSource, ThreadTs};
use crate::thread::HistoryFetcher;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_THREAD_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_THREAD_CACHE_MAX_SIZE: usize = 500;

/// The thread a message belongs to, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedThread {
    pub thread_ts: Option<ThreadTs>,
}

impl ResolvedThread {
    pub fn new(thread_ts: Option<ThreadTs>) -> Self {
        Self { thread_ts }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThreadTsResolverConfig {
    pub cache_ttl: Duration,
    /// Maximum number of cached keys; the oldest inserted key goes first
    pub max_size: usize,
}

impl Default for ThreadTsResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_THREAD_CACHE_TTL,
            max_size: DEFAULT_THREAD_CACHE_MAX_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    channel: String,
    ts: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.ts)
    }
}

struct Slot {
    /// Identifies the refresh allowed to settle this slot
    refresh_id: u64,
    entry: CacheEntry<ResolvedThread>,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CacheKey, Slot>,
    /// Keys in insertion order
    order: VecDeque<CacheKey>,
    next_refresh_id: u64,
}

impl CacheState {
    fn make_room(&mut self, max_size: usize) {
        while self.slots.len() >= max_size {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.slots.remove(&oldest);
            tracing::trace!(key = %oldest, "Evicted thread cache entry");
        }
    }
}

/// Keyed, TTL-bounded, single-flight cache of `(channel, ts) -> thread_ts`
pub struct ThreadTsResolver {
    fetcher: Arc<dyn HistoryFetcher>,
    config: ThreadTsResolverConfig,
    state: Arc<Mutex<CacheState>>,
}

impl ThreadTsResolver {
    pub fn new(fetcher: Arc<dyn HistoryFetcher>, config: ThreadTsResolverConfig) -> Self {
        let config = ThreadTsResolverConfig {
            max_size: config.max_size.max(1),
            ..config
        };

        tracing::info!(
            ttl_ms = config.cache_ttl.as_millis() as u64,
            max_size = config.max_size,
            "Creating thread resolution cache"
        );

        Self {
            fetcher,
            config,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Resolve the thread that replies to `message` should be grouped under.
    ///
    /// Remote failures resolve to no thread.
    pub async fn resolve(&self, message: &InboundMessage, source: MessageSource) -> ResolvedThread {
        if let Some(thread_ts) = &message.thread_ts {
            return ResolvedThread::new(Some(thread_ts.clone()));
        }

        // A plain top-level message has no thread to look up
        if source == MessageSource::Message && message.parent_user_id.is_none() {
            return ResolvedThread::default();
        }

        if message.ts.as_str().is_empty() {
            tracing::debug!(
                channel = %message.channel,
                source = source.as_str(),
                "Message has no ts, skipping thread resolution"
            );
            return ResolvedThread::default();
        }

        let key = CacheKey {
            channel: message.channel.as_str().to_string(),
            ts: message.ts.as_str().to_string(),
        };

        let pending = {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            let cached = state.slots.get(&key).map(|slot| {
                (
                    slot.entry.fresh_value(now).cloned(),
                    slot.entry.inflight.clone(),
                )
            });

            match cached {
                Some((Some(resolved), _)) => {
                    tracing::trace!(key = %key, "Thread cache hit");
                    return resolved;
                }
                Some((None, Some(inflight))) => {
                    tracing::debug!(key = %key, "Joining in-flight thread lookup");
                    inflight
                }
                _ => self.start_refresh(&mut state, key, now),
            }
        };

        pending.await
    }

    /// Register a refresh for `key`. Must be called with the state lock held.
    fn start_refresh(
        &self,
        state: &mut CacheState,
        key: CacheKey,
        now: Instant,
    ) -> Inflight<ResolvedThread> {
        state.next_refresh_id += 1;
        let refresh_id = state.next_refresh_id;

        tracing::debug!(key = %key, "Thread cache miss, fetching history");

        let fetcher = Arc::clone(&self.fetcher);
        let shared_state = Arc::clone(&self.state);
        let ttl = self.config.cache_ttl;
        let task_key = key.clone();

        let inflight = spawn_shared(async move {
            let resolved = lookup_thread_ts(fetcher.as_ref(), &task_key).await;

            let mut state = shared_state.lock().await;
            match state.slots.get_mut(&task_key) {
                Some(slot) if slot.refresh_id == refresh_id => {
                    slot.entry = CacheEntry::ready(resolved.clone(), Instant::now() + ttl);
                }
                _ => {
                    tracing::trace!(key = %task_key, "Thread cache entry evicted during lookup");
                }
            }

            resolved
        });

        match state.slots.get_mut(&key) {
            Some(slot) => {
                let previous = slot.entry.value.clone();
                slot.refresh_id = refresh_id;
                slot.entry = CacheEntry::refreshing(previous, now, inflight.clone());
            }
            None => {
                state.make_room(self.config.max_size);
                state.order.push_back(key.clone());
                state.slots.insert(
                    key,
                    Slot {
                        refresh_id,
                        entry: CacheEntry::refreshing(
                            ResolvedThread::default(),
                            now,
                            inflight.clone(),
                        ),
                    },
                );
            }
        }

        inflight
    }
}

async fn lookup_thread_ts(fetcher: &dyn HistoryFetcher, key: &CacheKey) -> ResolvedThread {
    let _timer = Timer::new("fetch_history", key.to_string());

    match catch_panic("fetch_history", fetcher.fetch_history(&key.channel, &key.ts)).await {
        Some(Ok(messages)) => {
            let thread_ts = messages
                .into_iter()
                .find(|m| m.ts == key.ts)
                .and_then(|m| m.thread_ts)
                .map(ThreadTs::new);

            tracing::debug!(
                key = %key,
                thread_ts = ?thread_ts,
                "Resolved thread from history"
            );
            ResolvedThread::new(thread_ts)
        }
        Some(Err(e)) => {
            tracing::warn!(
                key = %key,
                error = %e,
                "Failed to fetch history, treating message as unthreaded"
            );
            ResolvedThread::default()
        }
        None => ResolvedThread::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GateError, Result};
    use crate::thread::HistoryMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Fixed(Vec<HistoryMessage>),
        /// Answers every lookup with `root-<ts>`
        Echo,
        Fail,
    }

    struct FakeHistory {
        reply: Reply,
        delay: Duration,
        /// Lookups to fail before `reply` is used
        failures_left: AtomicUsize,
        panics_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeHistory {
        fn new(reply: Reply) -> Arc<Self> {
            Self::delayed(reply, Duration::ZERO)
        }

        fn delayed(reply: Reply, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply,
                delay,
                failures_left: AtomicUsize::new(0),
                panics_left: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing_first(reply: Reply, failures: usize) -> Arc<Self> {
            let fake = Self::new(reply);
            fake.failures_left.store(failures, Ordering::SeqCst);
            fake
        }

        fn panicking_first(reply: Reply, panics: usize) -> Arc<Self> {
            let fake = Self::new(reply);
            fake.panics_left.store(panics, Ordering::SeqCst);
            fake
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HistoryFetcher for FakeHistory {
        async fn fetch_history(
            &self,
            _channel: &str,
            latest_ts: &str,
        ) -> Result<Vec<HistoryMessage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if take_one(&self.panics_left) {
                panic!("history client crashed");
            }
            if take_one(&self.failures_left) {
                return Err(GateError::SlackApi("internal_error".to_string()));
            }
            match &self.reply {
                Reply::Fixed(messages) => Ok(messages.clone()),
                Reply::Echo => Ok(vec![HistoryMessage::new(
                    latest_ts,
                    Some(&format!("root-{}", latest_ts)),
                )]),
                Reply::Fail => Err(GateError::SlackApi("ratelimited".to_string())),
            }
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn resolver(fake: &Arc<FakeHistory>, cache_ttl: Duration, max_size: usize) -> ThreadTsResolver {
        ThreadTsResolver::new(
            fake.clone(),
            ThreadTsResolverConfig {
                cache_ttl,
                max_size,
            },
        )
    }

    fn thread(ts: &str) -> ResolvedThread {
        ResolvedThread::new(Some(ThreadTs::new(ts)))
    }

    #[tokio::test]
    async fn test_caches_resolved_thread_ts() {
        let fake = FakeHistory::new(Reply::Fixed(vec![HistoryMessage::new("1", Some("9"))]));
        let resolver = resolver(&fake, Duration::from_secs(60), 5);
        let message = InboundMessage::new("C1", "1").with_parent_user("U2");

        let first = resolver.resolve(&message, MessageSource::Message).await;
        let second = resolver.resolve(&message, MessageSource::Message).await;

        assert_eq!(first, thread("9"));
        assert_eq!(second, thread("9"));
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_app_mention_without_parent_is_resolved() {
        let fake = FakeHistory::new(Reply::Fixed(vec![HistoryMessage::new("2", Some("2.100"))]));
        let resolver = resolver(&fake, Duration::from_secs(60), 5);
        let message = InboundMessage::new("C2", "2").with_text("<@Ubot> hi");

        let resolved = resolver.resolve(&message, MessageSource::AppMention).await;

        assert_eq!(resolved, thread("2.100"));
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_top_level_message_is_not_resolved() {
        let fake = FakeHistory::new(Reply::Fixed(vec![]));
        let resolver = resolver(&fake, Duration::from_secs(60), 5);
        let message = InboundMessage::new("C3", "3").with_text("hello");

        let resolved = resolver.resolve(&message, MessageSource::Message).await;

        assert_eq!(resolved.thread_ts, None);
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_existing_thread_ts_skips_lookup() {
        let fake = FakeHistory::new(Reply::Echo);
        let resolver = resolver(&fake, Duration::from_secs(60), 5);
        let message = InboundMessage::new("C1", "5")
            .with_parent_user("U2")
            .with_thread_ts("4");

        let resolved = resolver.resolve(&message, MessageSource::AppMention).await;

        assert_eq!(resolved, thread("4"));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_ts_skips_lookup() {
        let fake = FakeHistory::new(Reply::Echo);
        let resolver = resolver(&fake, Duration::from_secs(60), 5);
        let message = InboundMessage::new("C1", "");

        let resolved = resolver.resolve(&message, MessageSource::AppMention).await;

        assert_eq!(resolved.thread_ts, None);
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_history_resolves_to_none() {
        let fake = FakeHistory::new(Reply::Fixed(vec![HistoryMessage::new("0.5", Some("0.1"))]));
        let resolver = resolver(&fake, Duration::from_secs(60), 5);
        let message = InboundMessage::new("C1", "1").with_parent_user("U2");

        let resolved = resolver.resolve(&message, MessageSource::Message).await;

        assert_eq!(resolved.thread_ts, None);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_resolves_to_none_and_is_cached() {
        let fake = FakeHistory::new(Reply::Fail);
        let resolver = resolver(&fake, Duration::from_secs(60), 5);
        let message = InboundMessage::new("C1", "1").with_parent_user("U2");

        let first = resolver.resolve(&message, MessageSource::Message).await;
        let second = resolver.resolve(&message, MessageSource::Message).await;

        assert_eq!(first.thread_ts, None);
        assert_eq!(second.thread_ts, None);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookup_is_retried_after_ttl() {
        let ttl = Duration::from_secs(60);
        let fake = FakeHistory::failing_first(Reply::Echo, 1);
        let resolver = resolver(&fake, ttl, 5);
        let message = InboundMessage::new("C1", "1").with_parent_user("U2");

        assert_eq!(resolver.resolve(&message, MessageSource::Message).await.thread_ts, None);
        tokio::time::advance(ttl).await;
        let resolved = resolver.resolve(&message, MessageSource::Message).await;

        assert_eq!(resolved, thread("root-1"));
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_lookup_is_retried_after_ttl() {
        let ttl = Duration::from_secs(60);
        let fake = FakeHistory::panicking_first(Reply::Echo, 1);
        let resolver = resolver(&fake, ttl, 5);
        let message = InboundMessage::new("C1", "1").with_parent_user("U2");

        assert_eq!(resolver.resolve(&message, MessageSource::Message).await.thread_ts, None);
        assert_eq!(resolver.resolve(&message, MessageSource::Message).await.thread_ts, None);
        assert_eq!(fake.calls(), 1);

        tokio::time::advance(ttl).await;
        let resolved = resolver.resolve(&message, MessageSource::Message).await;

        assert_eq!(resolved, thread("root-1"));
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let fake = FakeHistory::delayed(Reply::Echo, Duration::from_millis(100));
        let resolver = resolver(&fake, Duration::from_secs(60), 5);
        let message = InboundMessage::new("C1", "7").with_parent_user("U2");

        let results = futures::future::join_all(
            (0..10).map(|_| resolver.resolve(&message, MessageSource::Message)),
        )
        .await;

        assert_eq!(fake.calls(), 1);
        assert!(results.iter().all(|r| *r == thread("root-7")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_survives_cancelled_caller() {
        let fake = FakeHistory::delayed(Reply::Echo, Duration::from_millis(100));
        let resolver = resolver(&fake, Duration::from_secs(60), 5);
        let message = InboundMessage::new("C1", "8").with_parent_user("U2");

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            resolver.resolve(&message, MessageSource::Message),
        )
        .await;
        assert!(cancelled.is_err());

        let resolved = resolver.resolve(&message, MessageSource::Message).await;

        assert_eq!(resolved, thread("root-8"));
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let ttl = Duration::from_secs(60);
        let fake = FakeHistory::new(Reply::Echo);
        let resolver = resolver(&fake, ttl, 5);
        let message = InboundMessage::new("C1", "1").with_parent_user("U2");

        resolver.resolve(&message, MessageSource::Message).await;
        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        resolver.resolve(&message, MessageSource::Message).await;
        assert_eq!(fake.calls(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        let resolved = resolver.resolve(&message, MessageSource::Message).await;

        assert_eq!(resolved, thread("root-1"));
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn test_evicts_oldest_inserted_key() {
        let fake = FakeHistory::new(Reply::Echo);
        let resolver = resolver(&fake, Duration::from_secs(60), 2);
        let a = InboundMessage::new("C1", "a").with_parent_user("U2");
        let b = InboundMessage::new("C1", "b").with_parent_user("U2");
        let c = InboundMessage::new("C1", "c").with_parent_user("U2");

        resolver.resolve(&a, MessageSource::Message).await;
        resolver.resolve(&b, MessageSource::Message).await;
        // Reading `a` again does not protect it: eviction is by insertion order
        resolver.resolve(&a, MessageSource::Message).await;
        assert_eq!(fake.calls(), 2);

        resolver.resolve(&c, MessageSource::Message).await;
        assert_eq!(fake.calls(), 3);

        let again = resolver.resolve(&a, MessageSource::Message).await;
        assert_eq!(again, thread("root-a"));
        assert_eq!(fake.calls(), 4);

        // `a` pushed out `b`; `c` is still cached
        resolver.resolve(&c, MessageSource::Message).await;
        assert_eq!(fake.calls(), 4);
    }

    #[tokio::test]
    async fn test_zero_max_size_still_caches_one_key() {
        let fake = FakeHistory::new(Reply::Echo);
        let resolver = resolver(&fake, Duration::from_secs(60), 0);
        let message = InboundMessage::new("C1", "1").with_parent_user("U2");

        resolver.resolve(&message, MessageSource::Message).await;
        resolver.resolve(&message, MessageSource::Message).await;

        assert_eq!(fake.calls(), 1);
    }
}
