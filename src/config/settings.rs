use crate::error::{GateError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub slack: SlackConfig,
    pub allow_from: AllowFromConfig,
    pub thread_cache: ThreadCacheConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub app_token: String,
}

#[derive(Debug, Clone)]
pub struct AllowFromConfig {
    /// Statically configured senders, merged with the store list
    pub entries: Vec<String>,
    pub store_dir: PathBuf,
    pub cache_ttl: Duration,
    pub failure_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ThreadCacheConfig {
    pub ttl: Duration,
    pub max_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(GateError::Config(format!("Invalid LOG_FORMAT: {}", other))),
        }
    }
}

pub fn load_settings() -> Result<Settings> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    Settings::from_lookup(|key| std::env::var(key).ok())
}

impl Settings {
    /// Build settings from an arbitrary variable source (the process env in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| GateError::Config(format!("{} not set", key)))
        };

        let slack = SlackConfig {
            bot_token: required("SLACK_BOT_TOKEN")?,
            app_token: required("SLACK_APP_TOKEN")?,
        };

        let cache_ttl = Duration::from_secs(parse_or(&lookup, "ALLOW_FROM_CACHE_TTL_SECS", 15)?);
        let failure_ttl = match lookup("ALLOW_FROM_FAILURE_TTL_SECS") {
            Some(_) => Duration::from_secs(parse_or(&lookup, "ALLOW_FROM_FAILURE_TTL_SECS", 0)?),
            None => cache_ttl,
        };

        let allow_from = AllowFromConfig {
            entries: lookup("SLACK_ALLOW_FROM")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            store_dir: lookup("ALLOW_FROM_STORE_DIR")
                .unwrap_or_else(|| {
                    let home = lookup("HOME").unwrap_or_else(|| ".".to_string());
                    format!("{}/.slack_gate/credentials", home)
                })
                .into(),
            cache_ttl,
            failure_ttl,
        };

        let thread_cache = ThreadCacheConfig {
            ttl: Duration::from_millis(parse_or(&lookup, "THREAD_CACHE_TTL_MS", 60_000)?),
            max_size: parse_or(&lookup, "THREAD_CACHE_MAX_SIZE", 500)?,
        };

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::Pretty,
        };

        Ok(Settings {
            slack,
            allow_from,
            thread_cache,
            log_format,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| GateError::Config(format!("Invalid {}", key))),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
