//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::errors::WatchError;
use crate::http::client::HttpClient;
use crate::http::explorer::{ExplorerClient, SnapshotSource};
use crate::watch::controller::WatchEvent;
use crate::watch::fsm::StopReason;
use crate::watch::registry::WatchRegistry;

/// Watch every configured DAO against the explorer backend
pub async fn run(
    options: AppOptions,
    on_event: impl FnMut(&WatchEvent),
    shutdown_signal: impl Future<Output = ()>,
) -> Result<Vec<(String, StopReason)>, WatchError> {
    let http_client = HttpClient::new(&options.backend_base_url, options.request_timeout)?;
    info!("Using explorer backend at {}", http_client.base_url());
    let source = Arc::new(ExplorerClient::new(http_client));

    run_with_source(source, options, on_event, shutdown_signal).await
}

/// Run watch sessions over any snapshot source until each one stops or
/// the shutdown signal fires.
///
/// Events are handed to `on_event` in the order they are emitted.
pub async fn run_with_source<S: SnapshotSource + ?Sized + 'static>(
    source: Arc<S>,
    options: AppOptions,
    mut on_event: impl FnMut(&WatchEvent),
    shutdown_signal: impl Future<Output = ()>,
) -> Result<Vec<(String, StopReason)>, WatchError> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut registry = WatchRegistry::new(source, options.controller.clone(), events_tx);

    for dao_id in &options.dao_ids {
        match registry.watch(dao_id) {
            Ok(()) => {}
            Err(WatchError::AlreadyWatching(id)) => {
                warn!("DAO {} listed more than once, ignoring duplicate", id);
            }
            Err(e) => return Err(e),
        }
    }

    // Sessions are awaited directly, so one that stops without a terminal
    // event still ends the loop
    let mut results = Vec::new();
    tokio::pin!(shutdown_signal);
    loop {
        tokio::select! {
            biased;
            Some(event) = events_rx.recv() => {
                on_event(&event);
            }
            finished = registry.wait_any() => match finished {
                Some(result) => results.push(result),
                None => break,
            },
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received, cancelling {} watch(es)...", registry.len());
                registry.cancel_all();
                break;
            }
        }
    }

    results.extend(registry.join_all().await);

    // Events emitted before a session stopped or a cancel took effect
    while let Ok(event) = events_rx.try_recv() {
        on_event(&event);
    }

    for (dao_id, reason) in &results {
        info!("Watch for DAO {} ended: {:?}", dao_id, reason);
    }
    Ok(results)
}
