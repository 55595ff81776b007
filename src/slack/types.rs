use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! slack_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

slack_id!(ChannelId);
slack_id!(UserId);
slack_id!(ThreadTs);
slack_id!(MessageTs);

/// Which kind of push event delivered the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    Message,
    AppMention,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::AppMention => "app_mention",
        }
    }
}

/// An inbound message as seen by the gate
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: ChannelId,
    pub ts: MessageTs,
    pub thread_ts: Option<ThreadTs>,
    pub user: Option<UserId>,
    /// Sender display name, when the ingress path supplies one
    pub user_name: Option<String>,
    /// Author of the thread root, present on some thread replies
    pub parent_user_id: Option<UserId>,
    pub text: Option<String>,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, ts: impl Into<String>) -> Self {
        Self {
            channel: ChannelId::new(channel),
            ts: MessageTs::new(ts),
            thread_ts: None,
            user: None,
            user_name: None,
            parent_user_id: None,
            text: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(UserId::new(user));
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_parent_user(mut self, user: impl Into<String>) -> Self {
        self.parent_user_id = Some(UserId::new(user));
        self
    }

    pub fn with_thread_ts(mut self, ts: impl Into<String>) -> Self {
        self.thread_ts = Some(ThreadTs::new(ts));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}
