use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rss_bell::config::{ConfigLoader, ConfigWatcher, events};
use rss_bell::scheduler::ReloadCoordinator;
use rss_bell::services::Collaborators;
use rss_bell::{logging, utils};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = logging::init_logging()?;
    utils::http_client::install_rustls_provider();

    let loader = ConfigLoader::from_env();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %loader.path().display(),
        "rss-bell starting"
    );

    let shutdown = CancellationToken::new();
    let coordinator = Arc::new(ReloadCoordinator::new(
        loader.clone(),
        Collaborators::live(),
        shutdown.child_token(),
    ));

    let report = coordinator
        .initial_load()
        .await
        .with_context(|| format!("failed to load config from {}", loader.path().display()))?;
    if !report.failed.is_empty() {
        warn!(tasks = ?report.failed, "Some tasks failed to register");
    }

    let (event_tx, event_rx) = events::channel();
    let watcher = ConfigWatcher::new(loader.path()).spawn(event_tx.clone(), shutdown.child_token());
    let reload_signal = spawn_reload_signal(event_tx, shutdown.child_token());

    let runner = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run(event_rx).await })
    };

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received");
    shutdown.cancel();

    report_exit("reload coordinator", runner.await);
    report_exit("config watcher", watcher.await);
    if let Some(reload_signal) = reload_signal {
        report_exit("reload signal", reload_signal.await);
    }

    let report = coordinator.shutdown().await;
    info!(
        stopped = report.stopped,
        aborted = report.aborted,
        "rss-bell stopped"
    );
    Ok(())
}

/// Log a background task that ended abnormally. Returns whether it exited cleanly.
fn report_exit(task: &str, result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_panic() => {
            error!(task, "Background task panicked: {}", e);
            false
        }
        Err(e) => {
            warn!(task, "Background task did not finish: {}", e);
            false
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Forward `SIGHUP` as a reload request.
#[cfg(unix)]
fn spawn_reload_signal(
    tx: tokio::sync::mpsc::Sender<events::ConfigEvent>,
    cancel: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(sighup) => sighup,
        Err(e) => {
            warn!("Failed to install SIGHUP handler: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                received = sighup.recv() => {
                    if received.is_none()
                        || tx.send(events::ConfigEvent::ReloadRequested).await.is_err()
                    {
                        return;
                    }
                }
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_signal(
    _tx: tokio::sync::mpsc::Sender<events::ConfigEvent>,
    _cancel: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_exit() {
        assert!(report_exit("ok", tokio::spawn(async {}).await));

        let panicked = tokio::spawn(async { panic!("watcher crashed") }).await;
        assert!(!report_exit("panicked", panicked));

        let aborted = tokio::spawn(std::future::pending::<()>());
        aborted.abort();
        assert!(!report_exit("aborted", aborted.await));
    }
}
