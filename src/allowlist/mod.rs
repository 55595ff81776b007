//! Sender authorization
//!
//! The effective allow-list is the statically configured list merged with the
//! store list (cached for a short TTL). An empty effective list lets every
//! sender through.

mod auth;
mod cache;
mod matcher;
mod store;

pub use auth::{EffectiveAllowFrom, is_sender_allow_listed, resolve_effective_allow_from};
pub use cache::{AllowFromCache, DEFAULT_ALLOW_FROM_TTL, SLACK_CHANNEL_CLASS};
pub use matcher::{
    allow_list_matches, normalize_allow_list, normalize_allow_list_lower, normalize_slug,
};
pub use store::{AllowFromStore, FileAllowFromStore};
