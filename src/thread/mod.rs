//! Thread resolution for inbound messages
//!
//! Slack sometimes delivers thread replies without `thread_ts`. The resolver
//! recovers it from channel history and caches the answer per
//! `(channel, ts)` so repeated deliveries of the same message cost a single
//! `conversations.history` call.

mod history;
mod resolver;

pub use history::{HistoryFetcher, HistoryMessage};
pub use resolver::{
    DEFAULT_THREAD_CACHE_MAX_SIZE, DEFAULT_THREAD_CACHE_TTL, ResolvedThread, ThreadTsResolver,
    ThreadTsResolverConfig,
};
