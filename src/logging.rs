//! Logging utilities for structured tracing

use crate::config::LogFormat;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "slack_gate=debug,slack_morphism=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Track the duration of a remote call and log it on drop
pub struct Timer {
    start: Instant,
    operation: &'static str,
    key: String,
}

impl Timer {
    pub fn new(operation: &'static str, key: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation,
            key: key.into(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        tracing::debug!(
            operation = self.operation,
            key = %self.key,
            duration_ms = duration_ms,
            "Remote call completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_keeps_key() {
        let timer = Timer::new("fetch_history", "C1:1");
        assert_eq!(timer.operation, "fetch_history");
        assert_eq!(timer.key, "C1:1");
        // Timer will log on drop
    }
}
