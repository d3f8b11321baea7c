//! # Node Container
//!
//! Builds the block store, the peer registry and the sync engine from a
//! [`NodeConfig`] and holds them for the lifetime of the node.
//!
//! ```text
//! NodeConfig ──→ InMemoryBlockStore (genesis from seed)
//!            ──→ StaticPeerRegistry (self only)
//!            ──→ SyncEngine ←── NodeTransport, MetricsTransport
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use canon_sync::{
    InMemoryBlockStore, MetricsTransport, NodeTransport, StaticPeerRegistry, SyncCollaborators,
    SyncEngine,
};
use shared_types::PeerDescriptor;
use tracing::info;

use crate::adapters::{OfflineMetricsTransport, OfflineNode};
use crate::container::config::NodeConfig;

/// Services owned by the node.
pub struct NodeContainer {
    /// Validated configuration.
    pub config: NodeConfig,
    /// Registration table the roster is rebuilt from.
    pub registry: Arc<StaticPeerRegistry>,
    /// Local chain.
    pub store: Arc<InMemoryBlockStore>,
    /// Chain selection engine, not yet started.
    pub engine: SyncEngine,
}

impl NodeContainer {
    /// Build the container with offline transports.
    pub fn new(config: NodeConfig) -> Result<Self> {
        Self::with_transports(config, Arc::new(OfflineNode), Arc::new(OfflineMetricsTransport))
    }

    /// Build the container over the given transports.
    pub fn with_transports(
        config: NodeConfig,
        node: Arc<dyn NodeTransport>,
        metrics_transport: Arc<dyn MetricsTransport>,
    ) -> Result<Self> {
        config.validate().context("invalid node configuration")?;
        let local_peer = config.network.peer_id()?;

        let store = Arc::new(InMemoryBlockStore::with_genesis(
            config.storage.genesis_seed.as_bytes(),
        ));
        let registry = Arc::new(StaticPeerRegistry::new(vec![PeerDescriptor::new(
            local_peer,
            "127.0.0.1:0",
            config.network.node_name.clone(),
        )]));

        let engine = SyncEngine::init(
            config.sync.clone(),
            SyncCollaborators {
                local_peer,
                registry: registry.clone(),
                metrics_transport,
                node,
                store: store.clone(),
            },
        )
        .context("failed to initialize sync engine")?;

        info!(
            "[runtime] Container ready: node {} ({}), genesis {}",
            config.network.node_name,
            local_peer.short(),
            store.tip_digest().short()
        );

        Ok(Self {
            config,
            registry,
            store,
            engine,
        })
    }
}
