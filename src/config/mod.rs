mod settings;

pub use settings::{
    AllowFromConfig, LogFormat, Settings, SlackConfig, ThreadCacheConfig, load_settings,
};
