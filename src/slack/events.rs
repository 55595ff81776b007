use crate::error::{GateError, Result};
use crate::monitor::{MonitorContext, RouteDecision};
use crate::slack::{InboundMessage, MessageSource, SlackClient, ThreadTs, UserId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use slack_morphism::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

const PROCESSED_EVENT_RETENTION: Duration = Duration::from_secs(3600);

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}

#[derive(Clone)]
struct GateState {
    context: Arc<MonitorContext>,
    processed_events: Arc<DashMap<String, Instant>>,
}

pub struct EventHandler {
    slack_client: Arc<SlackClient>,
    context: Arc<MonitorContext>,
}

impl EventHandler {
    pub fn new(slack_client: Arc<SlackClient>, context: Arc<MonitorContext>) -> Self {
        Self {
            slack_client,
            context,
        }
    }

    /// Start listening for Slack events using Socket Mode
    pub async fn start(self) -> Result<()> {
        let state = GateState {
            context: self.context.clone(),
            processed_events: Arc::new(DashMap::new()),
        };

        tracing::debug!("Creating listener environment");
        let listener_environment = Arc::new(
            SlackClientEventsListenerEnvironment::new(self.slack_client.get_client())
                .with_error_handler(Self::error_handler)
                .with_user_state(state),
        );

        let callbacks =
            SlackSocketModeListenerCallbacks::new().with_push_events(Self::handle_push_event);

        let socket_mode_listener = SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment,
            callbacks,
        );

        tracing::info!("Connecting to Slack via Socket Mode");
        socket_mode_listener
            .listen_for(self.slack_client.get_app_token())
            .await
            .map_err(|e| GateError::SlackApi(e.to_string()))?;

        tracing::info!("Connected to Slack Socket Mode, gate is ready");
        socket_mode_listener.serve().await;

        Ok(())
    }

    async fn handle_push_event(
        event: SlackPushEventCallback,
        _client: Arc<SlackHyperClient>,
        user_state: SlackClientEventsUserState,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let state: GateState = {
            let storage = user_state.read().await;
            storage
                .get_user_state::<GateState>()
                .ok_or("gate state not registered")?
                .clone()
        };

        Self::cleanup_old_events(&state.processed_events);

        let Some((message, source)) = to_inbound(event.event) else {
            return Ok(());
        };

        // A mention arrives as both `message` and `app_mention`; handle it once
        let event_key = format!("{}:{}", message.channel, message.ts);
        if let Some(last_seen_ago) = Self::mark_processed(&state.processed_events, event_key.clone())
        {
            tracing::debug!(
                event_key = %event_key,
                source = source.as_str(),
                last_seen_ago = format_duration(last_seen_ago),
                "Duplicate event detected, skipping"
            );
            return Ok(());
        }

        // Acknowledge within Slack's 3 second window; history lookups run after
        tokio::spawn(async move {
            Self::process_message(message, source, state.context).await;
        });

        Ok(())
    }

    async fn process_message(
        message: InboundMessage,
        source: MessageSource,
        context: Arc<MonitorContext>,
    ) {
        let span = tracing::info_span!(
            "inbound",
            channel = %message.channel,
            ts = %message.ts,
            source = source.as_str(),
        );

        match context
            .route_message(&message, source)
            .instrument(span.clone())
            .await
        {
            RouteDecision::Dispatch(routed) => {
                let preview = match routed.text.char_indices().nth(150) {
                    Some((cut, _)) => format!("{}...", &routed.text[..cut]),
                    None => routed.text.clone(),
                };
                let _guard = span.enter();
                tracing::info!(
                    user = ?routed.user.as_ref().map(|u| u.as_str()),
                    thread_ts = ?routed.thread_ts.as_ref().map(|t| t.as_str()),
                    reply_thread_ts = %routed.reply_thread_ts,
                    message = %preview,
                    "Message accepted"
                );
            }
            RouteDecision::Blocked { sender } => {
                let _guard = span.enter();
                tracing::debug!(sender = %sender, "Message blocked by allow-list");
            }
        }
    }

    fn error_handler(
        err: Box<dyn std::error::Error + Send + Sync>,
        _client: Arc<SlackHyperClient>,
        _states: SlackClientEventsUserState,
    ) -> HttpStatusCode {
        tracing::error!(
            error = %err,
            error_kind = std::any::type_name_of_val(&*err),
            "Slack event error"
        );
        HttpStatusCode::OK
    }

    /// Record `event_key` as processed. Returns how long ago it was first seen
    /// if it was already recorded.
    fn mark_processed(events: &DashMap<String, Instant>, event_key: String) -> Option<Duration> {
        match events.entry(event_key) {
            Entry::Occupied(seen) => Some(seen.get().elapsed()),
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                None
            }
        }
    }

    fn cleanup_old_events(events: &DashMap<String, Instant>) {
        let mut removed = 0;

        events.retain(|_key, instant| {
            let keep = instant.elapsed() < PROCESSED_EVENT_RETENTION;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            tracing::debug!(removed_count = removed, "Cleaned up old events from cache");
        }
    }
}

/// Convert a push event into an inbound message, or `None` for events the gate ignores
fn to_inbound(event: SlackEventCallbackBody) -> Option<(InboundMessage, MessageSource)> {
    match event {
        SlackEventCallbackBody::AppMention(mention) => {
            let message = InboundMessage {
                channel: mention.channel.to_string().into(),
                ts: mention.origin.ts.to_string().into(),
                thread_ts: mention.origin.thread_ts.map(|t| ThreadTs::new(t.to_string())),
                user: Some(UserId::new(mention.user.to_string())),
                user_name: None,
                parent_user_id: None,
                text: mention.content.text,
            };
            Some((message, MessageSource::AppMention))
        }
        SlackEventCallbackBody::Message(message) => {
            if message.sender.bot_id.is_some() {
                tracing::debug!("Ignoring bot message");
                return None;
            }

            match message.subtype {
                Some(SlackMessageEventType::MessageChanged) => {
                    tracing::debug!("Ignoring message edit");
                    return None;
                }
                Some(SlackMessageEventType::ChannelJoin) => {
                    tracing::debug!("Ignoring channel join");
                    return None;
                }
                _ => {}
            }

            let Some(channel) = message.origin.channel else {
                tracing::debug!("Ignoring message without channel");
                return None;
            };

            let inbound = InboundMessage {
                channel: channel.to_string().into(),
                ts: message.origin.ts.to_string().into(),
                thread_ts: message.origin.thread_ts.map(|t| ThreadTs::new(t.to_string())),
                user: message.sender.user.map(|u| UserId::new(u.to_string())),
                user_name: None,
                parent_user_id: None,
                text: message.content.and_then(|c| c.text),
            };
            Some((inbound, MessageSource::Message))
        }
        _ => {
            tracing::debug!("Unhandled event type");
            None
        }
    }
}
