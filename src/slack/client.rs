use crate::config::SlackConfig;
use crate::error::{GateError, Result};
use crate::thread::{HistoryFetcher, HistoryMessage};
use async_trait::async_trait;
use slack_morphism::prelude::*;
use std::sync::Arc;

pub struct SlackClient {
    client: Arc<SlackHyperClient>,
    token: SlackApiToken,
    app_token: SlackApiToken,
}

impl SlackClient {
    pub fn new(config: SlackConfig) -> Result<Self> {
        let connector =
            SlackClientHyperConnector::new().map_err(|e| GateError::SlackApi(e.to_string()))?;

        let client = Arc::new(slack_morphism::SlackClient::new(connector));
        let token = SlackApiToken::new(config.bot_token.into());
        let app_token = SlackApiToken::new(config.app_token.into());

        Ok(Self {
            client,
            token,
            app_token,
        })
    }

    pub fn get_client(&self) -> Arc<SlackHyperClient> {
        self.client.clone()
    }

    pub fn get_app_token(&self) -> &SlackApiToken {
        &self.app_token
    }
}

#[async_trait]
impl HistoryFetcher for SlackClient {
    /// Ask for exactly the message at `latest_ts`
    async fn fetch_history(&self, channel: &str, latest_ts: &str) -> Result<Vec<HistoryMessage>> {
        let session = self.client.open_session(&self.token);

        let request = SlackApiConversationsHistoryRequest::new()
            .with_channel(SlackChannelId(channel.to_string()))
            .with_latest(SlackTs(latest_ts.to_string()))
            .with_oldest(SlackTs(latest_ts.to_string()))
            .with_inclusive(true)
            .with_limit(1);

        let response = session
            .conversations_history(&request)
            .await
            .map_err(|e| GateError::SlackApi(e.to_string()))?;

        tracing::trace!(
            channel = %channel,
            latest_ts = %latest_ts,
            returned = response.messages.len(),
            "conversations.history response"
        );

        Ok(response
            .messages
            .into_iter()
            .map(|m| HistoryMessage {
                ts: m.origin.ts.to_string(),
                thread_ts: m.origin.thread_ts.map(|t| t.to_string()),
            })
            .collect())
    }
}
