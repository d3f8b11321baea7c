//! # Offline Network
//!
//! Transports for a node started without a wire protocol. No peer is ever
//! connected, so the machine stays in `Connecting` and the roster refresh
//! records nothing.

use async_trait::async_trait;
use canon_sync::{MetricsTransport, NodeTransport, PeerSession, SyncError};
use shared_types::{BlockHeight, Digest, PeerDescriptor, PeerId, RawBlock};

const OFFLINE: &str = "no network transport configured";

/// `NodeTransport` with zero connections.
#[derive(Debug, Default)]
pub struct OfflineNode;

#[async_trait]
impl NodeTransport for OfflineNode {
    fn conn_count(&self) -> usize {
        0
    }

    async fn remote_digest_of_height(
        &self,
        _peer: &PeerId,
        _height: BlockHeight,
    ) -> Result<Digest, SyncError> {
        Err(SyncError::Network(OFFLINE.into()))
    }

    async fn get_block_data(
        &self,
        _peer: &PeerId,
        _height: BlockHeight,
    ) -> Result<RawBlock, SyncError> {
        Err(SyncError::Network(OFFLINE.into()))
    }

    async fn query_block_height(&self, _peer: &PeerId) -> Result<BlockHeight, SyncError> {
        Err(SyncError::Network(OFFLINE.into()))
    }
}

/// `MetricsTransport` that cannot open sessions.
#[derive(Debug, Default)]
pub struct OfflineMetricsTransport;

#[async_trait]
impl MetricsTransport for OfflineMetricsTransport {
    async fn open_session(&self, peer: &PeerDescriptor) -> Result<Box<dyn PeerSession>, SyncError> {
        Err(SyncError::Network(format!("{OFFLINE} ({})", peer.address)))
    }
}
