use crate::error::Result;
use async_trait::async_trait;

/// The subset of a history message the resolver looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub ts: String,
    pub thread_ts: Option<String>,
}

impl HistoryMessage {
    pub fn new(ts: impl Into<String>, thread_ts: Option<&str>) -> Self {
        Self {
            ts: ts.into(),
            thread_ts: thread_ts.map(String::from),
        }
    }
}

/// Remote access to channel history
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// Fetch the messages of `channel` up to and including `latest_ts`.
    async fn fetch_history(&self, channel: &str, latest_ts: &str) -> Result<Vec<HistoryMessage>>;
}
