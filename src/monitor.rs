//! Per-message gatekeeping: sender authorization and thread grouping

use crate::allowlist::{
    AllowFromCache, EffectiveAllowFrom, is_sender_allow_listed, resolve_effective_allow_from,
};
use crate::slack::{ChannelId, InboundMessage, MessageSource, MessageTs, ThreadTs, UserId};
use crate::thread::ThreadTsResolver;
use std::sync::Arc;

/// Long-lived state shared by every event callback
pub struct MonitorContext {
    /// Statically configured senders
    pub allow_from: Vec<String>,
    pub allow_from_cache: Arc<AllowFromCache>,
    pub thread_resolver: Arc<ThreadTsResolver>,
}

/// A message cleared for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedMessage {
    pub channel: ChannelId,
    pub ts: MessageTs,
    pub user: Option<UserId>,
    pub text: String,
    pub source: MessageSource,
    pub thread_ts: Option<ThreadTs>,
    /// Where replies go: the resolved thread, or a new thread on the message itself
    pub reply_thread_ts: ThreadTs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Dispatch(RoutedMessage),
    Blocked { sender: String },
}

impl MonitorContext {
    pub fn new(
        allow_from: Vec<String>,
        allow_from_cache: Arc<AllowFromCache>,
        thread_resolver: Arc<ThreadTsResolver>,
    ) -> Self {
        Self {
            allow_from,
            allow_from_cache,
            thread_resolver,
        }
    }

    pub async fn effective_allow_from(&self) -> EffectiveAllowFrom {
        resolve_effective_allow_from(&self.allow_from, &self.allow_from_cache).await
    }

    pub async fn route_message(
        &self,
        message: &InboundMessage,
        source: MessageSource,
    ) -> RouteDecision {
        let effective = self.effective_allow_from().await;
        let sender = message
            .user
            .as_ref()
            .map(|u| u.as_str())
            .unwrap_or_default();

        if !is_sender_allow_listed(
            &effective.allow_from_lower,
            sender,
            message.user_name.as_deref(),
        ) {
            tracing::info!(
                channel = %message.channel,
                sender = %sender,
                allow_list_len = effective.allow_from.len(),
                "Sender not allow-listed, dropping message"
            );
            return RouteDecision::Blocked {
                sender: sender.to_string(),
            };
        }

        let resolved = self.thread_resolver.resolve(message, source).await;
        let reply_thread_ts = resolved
            .thread_ts
            .clone()
            .unwrap_or_else(|| ThreadTs::new(message.ts.as_str()));

        RouteDecision::Dispatch(RoutedMessage {
            channel: message.channel.clone(),
            ts: message.ts.clone(),
            user: message.user.clone(),
            text: message.text.clone().unwrap_or_default(),
            source,
            thread_ts: resolved.thread_ts,
            reply_thread_ts,
        })
    }
}
