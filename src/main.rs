//! hostsync daemon entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;
use tokio::sync::oneshot;

use hostsync::api;
use hostsync::config::Config;
use hostsync::error::log_scan_failure;
use hostsync::control::Controller;
use hostsync::{Connection, DockerRuntime, HostsFile, Reconciler, Watcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting hostsync with config: {:?}", cfg);

    // Docker connection, checked once; health re-checks it later
    let runtime = Arc::new(DockerRuntime::connect());
    let connection = Arc::new(Connection::establish(runtime).await);

    let hosts = Arc::new(HostsFile::new(&cfg.hosts_file));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&connection),
        hosts,
        cfg.extractor(),
    ));

    // Initial scan before listening
    info!("Running initial scan");
    if let Err(e) = reconciler.run().await {
        log_scan_failure("Initial scan", &e);
    }

    // Event watcher
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let watcher = Watcher::new(Arc::clone(&reconciler), cfg.reconnect_policy());
    let watcher_handle = tokio::spawn(async move {
        if let Err(e) = watcher.run(shutdown_rx).await {
            error!("Event watcher stopped: {}", e);
        }
    });

    // HTTP control surface
    let controller = Arc::new(Controller::new(reconciler));
    let api_bind = cfg.api_bind;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_bind, controller).await {
            error!("HTTP server failed: {}", e);
        }
    });

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    // The watcher may already have exited; a closed receiver is fine
    let _ = shutdown_tx.send(());
    if let Err(e) = watcher_handle.await {
        error!("Event watcher task failed: {}", e);
    }
    api_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
