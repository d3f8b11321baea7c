//! The running node.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use canon_sync::{SyncStatus, SyncStatusApi};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::container::{NodeConfig, NodeContainer};

/// Interval between progress log lines.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the container and the status reporter task.
pub struct NodeRuntime {
    container: Arc<NodeContainer>,
    shutdown_tx: watch::Sender<bool>,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl NodeRuntime {
    /// Build the runtime from configuration with offline transports.
    pub fn new(config: NodeConfig) -> Result<Self> {
        Ok(Self::from_container(NodeContainer::new(config)?))
    }

    /// Wrap an already built container.
    pub fn from_container(container: NodeContainer) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            container: Arc::new(container),
            shutdown_tx,
            reporter: Mutex::new(None),
        }
    }

    /// Start the engine and the status reporter.
    pub fn start(&self) -> Result<()> {
        info!("===========================================");
        info!("  Canon Node Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        self.container.engine.start()?;
        let handle = tokio::spawn(report_status(
            self.container.engine.subscribe_status(),
            self.shutdown_tx.subscribe(),
        ));
        *self.reporter.lock() = Some(handle);

        info!(
            "[runtime] Node {} running, local height {}",
            self.container.config.network.node_name,
            self.container.engine.status().local_height
        );
        Ok(())
    }

    /// Stop the engine and the reporter.
    pub async fn shutdown(&self) {
        info!("[runtime] Initiating graceful shutdown...");
        self.shutdown_tx.send_replace(true);
        self.container.engine.shutdown().await;
        let reporter = self.reporter.lock().take();
        if let Some(handle) = reporter {
            if let Err(e) = handle.await {
                warn!("[runtime] Status reporter ended abnormally: {}", e);
            }
        }
        info!("[runtime] Shutdown complete");
    }

    /// Current engine status.
    pub fn status(&self) -> SyncStatus {
        self.container.engine.status()
    }

    /// The container.
    pub fn container(&self) -> Arc<NodeContainer> {
        Arc::clone(&self.container)
    }
}

/// Log state changes as they happen and progress on a timer.
async fn report_status(
    mut status: watch::Receiver<SyncStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(STATUS_LOG_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_state = status.borrow().state;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.state != last_state {
                    info!(
                        "[runtime] {} -> {} (height {}/{})",
                        last_state, current.state, current.local_height, current.target_height
                    );
                    last_state = current.state;
                }
            }
            _ = ticker.tick() => {
                let current = status.borrow().clone();
                info!(
                    "[runtime] {} height {}/{} ({:.0}%), mode {}",
                    current.state,
                    current.local_height,
                    current.target_height,
                    current.progress() * 100.0,
                    current.operating_mode
                );
            }
        }
    }
}
