use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Slack API error: {0}")]
    SlackApi(String),

    #[error("Allow-from store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;
