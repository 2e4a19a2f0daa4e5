use std::sync::Arc;

use tracing::info;

use airtime::config::Config;
use airtime::engine::{Engine, EngineError};
use airtime::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    airtime::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::open(config.wal_path(), config.grid, notify)?);

    for (i, name) in config.tags.iter().enumerate() {
        match engine.register_tag(i as i64 + 1, name.clone()).await {
            Ok(()) => {}
            Err(EngineError::TagExists(id)) => {
                tracing::warn!("tag {id} already registered under another name, keeping it");
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("airtime engine ready");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  {}", engine.grid());
    info!("  slots: {}", engine.store().len());
    info!("  livestreams: {}", engine.catalog.len().await);
    let metrics = config
        .metrics_port
        .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"));
    info!("  metrics: {metrics}");

    let compactor = tokio::spawn(airtime::compactor::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.compact_interval,
    ));

    // Graceful shutdown: stop background work on SIGTERM/ctrl-c, then compact once
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    compactor.abort();
    if let Err(e) = engine.compact_wal().await {
        tracing::error!("final WAL compaction failed: {e}");
    }

    info!("airtime stopped");
    Ok(())
}
