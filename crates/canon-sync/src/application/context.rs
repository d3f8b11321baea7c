//! # Sync Context
//!
//! Explicit record shared by reference between the machine, the roster and
//! the engine. Built once at startup; `shutdown()` tears it down.

use shared_types::OperatingMode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::SyncConfig;
use crate::domain::{SyncError, SyncStatus};
use crate::ports::{BlockStore, CandidateSource, NodeTransport};

/// Collaborators and channels of one running engine.
pub struct SyncContext {
    /// Engine configuration.
    pub config: SyncConfig,
    /// Network transport.
    pub node: Arc<dyn NodeTransport>,
    /// Local block store.
    pub store: Arc<dyn BlockStore>,
    /// Source of election candidates.
    pub candidates: Arc<dyn CandidateSource>,
    mode_tx: watch::Sender<OperatingMode>,
    status_tx: watch::Sender<SyncStatus>,
    shutdown_tx: watch::Sender<bool>,
}

impl SyncContext {
    /// Validate `config` and build the context.
    pub fn init(
        config: SyncConfig,
        node: Arc<dyn NodeTransport>,
        store: Arc<dyn BlockStore>,
        candidates: Arc<dyn CandidateSource>,
    ) -> Result<Arc<Self>, SyncError> {
        config.validate()?;

        let (mode_tx, _) = watch::channel(OperatingMode::Syncing);
        let (status_tx, _) = watch::channel(SyncStatus {
            local_height: store.height(),
            fast_sync_enabled: config.fast_sync_enabled,
            ..Default::default()
        });
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            config,
            node,
            store,
            candidates,
            mode_tx,
            status_tx,
            shutdown_tx,
        }))
    }

    /// Switch the node-wide operating mode. Returns whether it changed.
    pub fn set_mode(&self, mode: OperatingMode) -> bool {
        let changed = self.mode_tx.send_if_modified(|current| {
            if *current == mode {
                false
            } else {
                *current = mode;
                true
            }
        });
        if changed {
            info!("[sync] Operating mode -> {}", mode);
        }
        changed
    }

    /// Current operating mode.
    pub fn operating_mode(&self) -> OperatingMode {
        *self.mode_tx.borrow()
    }

    /// Watch operating-mode changes.
    pub fn subscribe_mode(&self) -> watch::Receiver<OperatingMode> {
        self.mode_tx.subscribe()
    }

    /// Publish a machine snapshot.
    pub fn publish_status(&self, status: SyncStatus) {
        self.status_tx.send_replace(status);
    }

    /// Latest machine snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// Watch machine snapshots.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Whether shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Signal every task holding a shutdown receiver.
    pub fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("[sync] Shutdown requested");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryBlockStore;
    use crate::testing::{MockNode, StaticRoster, TEST_GENESIS_SEED};

    fn context(config: SyncConfig) -> Result<Arc<SyncContext>, SyncError> {
        SyncContext::init(
            config,
            Arc::new(MockNode::new()),
            Arc::new(InMemoryBlockStore::with_genesis(TEST_GENESIS_SEED)),
            Arc::new(StaticRoster::default()),
        )
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let config = SyncConfig {
            fetch_batch_size: 0,
            ..SyncConfig::for_testing()
        };
        assert!(matches!(context(config), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_mode_changes_are_observed() {
        let ctx = context(SyncConfig::for_testing()).unwrap();
        let mut rx = ctx.subscribe_mode();
        assert_eq!(ctx.operating_mode(), OperatingMode::Syncing);

        assert!(!ctx.set_mode(OperatingMode::Syncing));
        assert!(!rx.has_changed().unwrap());

        assert!(ctx.set_mode(OperatingMode::Normal));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), OperatingMode::Normal);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_receivers() {
        let ctx = context(SyncConfig::for_testing()).unwrap();
        let mut rx = ctx.shutdown_signal();
        ctx.shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(ctx.is_shutting_down());
    }
}
