use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use classgrid::config::Config;
use classgrid::directory::InMemoryDirectory;
use classgrid::engine::Engine;
use classgrid::http::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    classgrid::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    let directory = match &config.directory_path {
        Some(path) => InMemoryDirectory::load(path)?,
        None => {
            warn!("CLASSGRID_DIRECTORY not set, every reference lookup will fail");
            InMemoryDirectory::new()
        }
    };

    let wal_path = config.wal_path();
    let engine = Arc::new(
        Engine::new(wal_path.clone(), Arc::new(directory))
            .with_context(|| format!("opening WAL {}", wal_path.display()))?,
    );
    info!(
        assignments = engine.assignment_count(),
        rooms = engine.list_rooms().len(),
        "state replayed from {}",
        wal_path.display()
    );

    tokio::spawn(classgrid::compactor::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.compact_interval,
    ));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("classgrid listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    http::serve(listener, AppState { engine }, shutdown_signal()).await?;

    info!("classgrid stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
