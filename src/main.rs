use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use headline_digest::cache::TtlCache;
use headline_digest::config::Config;
use headline_digest::dashboard::{start_dashboard, AppState};
use headline_digest::events::new_event_channel;
use headline_digest::pipeline::Analyzer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("headline_digest=info")),
        )
        .init();

    info!(
        "Headline digest starting (model {}, index ticker {})",
        config.gemini_model, config.index_ticker
    );

    let event_tx = new_event_channel();
    let analyzer = Analyzer::from_config(&config)?.with_events(event_tx.clone());
    let cache = Arc::new(TtlCache::new(std::time::Duration::from_secs(
        config.cache_ttl_secs,
    )));

    if cache.is_enabled() {
        info!("Caching analyses for {}s", config.cache_ttl_secs);
        let purge_cache = Arc::clone(&cache);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(purge_cache.ttl());
            loop {
                interval.tick().await;
                purge_cache.purge_expired();
            }
        });
    } else {
        info!("Analysis cache disabled");
    }

    let state = AppState {
        analyzer: Arc::new(analyzer),
        cache,
        event_tx,
        default_ticker: config.default_ticker.clone(),
    };

    start_dashboard(&config, state).await?;

    info!("Shutdown complete");
    Ok(())
}
