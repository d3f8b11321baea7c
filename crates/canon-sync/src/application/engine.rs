//! # Sync Engine
//!
//! Wires the roster, the context and the machine, and owns their tasks.

use parking_lot::Mutex;
use shared_types::{OperatingMode, PeerId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::context::SyncContext;
use super::machine::Machine;
use super::metrics_voting::MetricsPeersVoting;
use crate::config::SyncConfig;
use crate::domain::{CandidateView, SyncError, SyncStatus};
use crate::ports::{
    BlockStore, CandidateSource, MetricsTransport, NodeTransport, PeerRegistry, SyncStatusApi,
};

/// External collaborators injected at startup.
pub struct SyncCollaborators {
    /// Our own peer id, excluded from the roster.
    pub local_peer: PeerId,
    /// Peer registration table.
    pub registry: Arc<dyn PeerRegistry>,
    /// Opens per-peer metric sessions.
    pub metrics_transport: Arc<dyn MetricsTransport>,
    /// Network transport.
    pub node: Arc<dyn NodeTransport>,
    /// Local block store.
    pub store: Arc<dyn BlockStore>,
}

/// Chain selection and synchronization engine.
pub struct SyncEngine {
    context: Arc<SyncContext>,
    metrics_voting: Arc<MetricsPeersVoting>,
    machine: Mutex<Option<Machine>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Build the engine. Nothing runs until [`SyncEngine::start`].
    pub fn init(config: SyncConfig, collaborators: SyncCollaborators) -> Result<Self, SyncError> {
        config.validate()?;

        let metrics_voting = Arc::new(MetricsPeersVoting::new(
            config.clone(),
            collaborators.local_peer,
            collaborators.registry,
            collaborators.metrics_transport,
            Arc::clone(&collaborators.store),
        ));
        let candidates: Arc<dyn CandidateSource> = metrics_voting.clone();
        let context = SyncContext::init(
            config,
            collaborators.node,
            collaborators.store,
            candidates,
        )?;
        let machine = Machine::new(Arc::clone(&context));

        Ok(Self {
            context,
            metrics_voting,
            machine: Mutex::new(Some(machine)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the roster refresh task and the machine task.
    pub fn start(&self) -> Result<(), SyncError> {
        let machine = self.machine.lock().take().ok_or(SyncError::AlreadyStarted)?;

        self.metrics_voting.update_candidates();
        let refresh = tokio::spawn(
            Arc::clone(&self.metrics_voting).run(self.context.shutdown_signal()),
        );
        let cycle = tokio::spawn(machine.run(self.context.shutdown_signal()));

        self.tasks.lock().extend([refresh, cycle]);
        info!(
            "[sync] Engine started (min peers {}, fork protection {})",
            self.context.config.min_connected_peers, self.context.config.fork_protection
        );
        Ok(())
    }

    /// Signal shutdown and wait for both tasks.
    pub async fn shutdown(&self) {
        self.context.shutdown();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("[sync] Task ended abnormally: {}", e);
            }
        }
        info!("[sync] Engine stopped");
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    /// The candidate roster.
    pub fn metrics_voting(&self) -> &Arc<MetricsPeersVoting> {
        &self.metrics_voting
    }

    /// Watch machine snapshots.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.context.subscribe_status()
    }

    /// Watch operating-mode changes.
    pub fn subscribe_mode(&self) -> watch::Receiver<OperatingMode> {
        self.context.subscribe_mode()
    }
}

impl SyncStatusApi for SyncEngine {
    fn status(&self) -> SyncStatus {
        self.context.status()
    }

    fn operating_mode(&self) -> OperatingMode {
        self.context.operating_mode()
    }

    fn roster(&self) -> Vec<CandidateView> {
        self.metrics_voting.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryBlockStore, StaticPeerRegistry};
    use crate::domain::SyncState;
    use crate::testing::{test_peer, MockChain, MockMetricsTransport, MockNode, TEST_GENESIS_SEED};

    fn engine(node: Arc<MockNode>, peers: Vec<u8>) -> SyncEngine {
        let registry = Arc::new(StaticPeerRegistry::new(
            peers.into_iter().map(test_peer).collect(),
        ));
        SyncEngine::init(
            SyncConfig::for_testing(),
            SyncCollaborators {
                local_peer: test_peer(0).id,
                registry,
                metrics_transport: Arc::new(MockMetricsTransport::new(Arc::clone(&node))),
                node,
                store: Arc::new(InMemoryBlockStore::with_genesis(TEST_GENESIS_SEED)),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let engine = engine(Arc::new(MockNode::new()), vec![]);
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(SyncError::AlreadyStarted)));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_initial_status() {
        let engine = engine(Arc::new(MockNode::new()), vec![1]);
        let status = engine.status();
        assert_eq!(status.state, SyncState::Connecting);
        assert_eq!(status.local_height, 0);
        assert!(!engine.is_synced());
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_syncs_and_shuts_down() {
        let node = Arc::new(MockNode::new());
        let chain = MockChain::build(12, 1);
        node.serve(test_peer(1).id, chain);
        node.set_conn_count(1);
        let engine = engine(Arc::clone(&node), vec![0, 1]);
        let mut status = engine.subscribe_status();

        engine.start().unwrap();
        while !status.borrow_and_update().is_synced() {
            status.changed().await.unwrap();
        }

        assert_eq!(engine.status().local_height, 12);
        assert_eq!(engine.roster().len(), 1);
        engine.shutdown().await;
    }
}
