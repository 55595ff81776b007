mod client;
mod events;
mod types;

pub use client::SlackClient;
pub use events::EventHandler;
pub use types::{ChannelId, InboundMessage, MessageSource, MessageTs, ThreadTs, UserId};
