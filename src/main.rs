use slack_gate::allowlist::{AllowFromCache, FileAllowFromStore};
use slack_gate::config::load_settings;
use slack_gate::error::Result;
use slack_gate::logging::init_tracing;
use slack_gate::monitor::MonitorContext;
use slack_gate::slack::{EventHandler, SlackClient};
use slack_gate::thread::{ThreadTsResolver, ThreadTsResolverConfig};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let settings = load_settings()?;
    init_tracing(settings.log_format);

    tracing::info!("🚀 Starting Slack Gate");
    tracing::debug!(
        static_allow_from = settings.allow_from.entries.len(),
        store_dir = ?settings.allow_from.store_dir,
        "Configuration loaded"
    );

    let slack_client = Arc::new(SlackClient::new(settings.slack.clone())?);
    tracing::info!("Slack client created");

    let store = FileAllowFromStore::new(settings.allow_from.store_dir.clone());
    tracing::info!(store_dir = ?store.dir(), "Allow-from store ready");

    let allow_from_cache = Arc::new(AllowFromCache::with_ttl(
        Arc::new(store),
        settings.allow_from.cache_ttl,
        settings.allow_from.failure_ttl,
    ));

    let thread_resolver = Arc::new(ThreadTsResolver::new(
        slack_client.clone(),
        ThreadTsResolverConfig {
            cache_ttl: settings.thread_cache.ttl,
            max_size: settings.thread_cache.max_size,
        },
    ));

    let context = Arc::new(MonitorContext::new(
        settings.allow_from.entries.clone(),
        allow_from_cache,
        thread_resolver,
    ));

    let event_handler = EventHandler::new(slack_client, context);

    tokio::select! {
        result = event_handler.start() => {
            tracing::info!("Event handler completed");
            result
        }
        signal_name = shutdown_signal() => {
            tracing::info!(signal = %signal_name, "Received shutdown signal, exiting");
            Ok(())
        }
    }
}

/// Wait for SIGINT, SIGTERM or SIGQUIT (Ctrl+C only on non-Unix)
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        let mut sigquit = signal(SignalKind::quit()).expect("Failed to setup SIGQUIT handler");

        tokio::select! {
            _ = sigint.recv() => "SIGINT (Ctrl+C)",
            _ = sigterm.recv() => "SIGTERM",
            _ = sigquit.recv() => "SIGQUIT",
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        "Ctrl+C"
    }
}
