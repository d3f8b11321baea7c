//! # Outbound Ports
//!
//! Traits for external collaborators: network transport, local block store,
//! the peer registration table and per-peer metric sessions.
//!
//! The sync engine owns none of these. The runtime injects concrete adapters;
//! tests inject the doubles from [`crate::testing`].

use async_trait::async_trait;
use shared_types::{
    BlockHeight, Digest, PeerDescriptor, PeerId, RawBlock, StorageError,
};
use std::sync::Arc;
use tokio::time::Instant;

use crate::domain::{CandidateMetrics, SyncError};

/// A remote peer as seen by elections and the machine.
///
/// Every accessor the machine and the voting tally need is on the trait, so no
/// caller downcasts to a concrete roster type.
pub trait Candidate: Send + Sync {
    /// Peer identity.
    fn peer_id(&self) -> PeerId;

    /// Remote network address.
    fn remote_addr(&self) -> String;

    /// Name announced by the peer.
    fn name(&self) -> String;

    /// Snapshot of the cached metrics.
    ///
    /// Fails with [`SyncError::InvariantMissingMetrics`] if the roster holds
    /// no record for this peer.
    fn metrics(&self) -> Result<CandidateMetrics, SyncError>;

    /// Cached remote height.
    ///
    /// Each accessor below takes its own [`Candidate::metrics`] snapshot, so
    /// two calls may straddle a refresh. Callers that need height and digest
    /// from the same refresh, as [`crate::algorithms::Voting::vote_by`] does,
    /// read `metrics()` once instead.
    fn cached_remote_height(&self) -> Result<BlockHeight, SyncError> {
        Ok(self.metrics()?.remote_height)
    }

    /// Cached remote digest at the local height of the last refresh.
    fn cached_remote_digest_of_local_height(&self) -> Result<Option<Digest>, SyncError> {
        Ok(self.metrics()?.remote_digest_of_local_height)
    }

    /// Local height the cached digest refers to.
    fn local_height_at_request_time(&self) -> Result<BlockHeight, SyncError> {
        Ok(self.metrics()?.local_height_at_request_time)
    }

    /// When the cached metrics were last refreshed.
    fn last_response_time(&self) -> Result<Option<Instant>, SyncError> {
        Ok(self.metrics()?.last_response_time)
    }
}

/// Something that can list the current voting candidates.
pub trait CandidateSource: Send + Sync {
    /// Candidates eligible to vote this round.
    fn candidates(&self) -> Vec<Arc<dyn Candidate>>;
}

/// Network transport of the local node.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Number of currently connected peers.
    fn conn_count(&self) -> usize;

    /// The peer's digest at `height`.
    async fn remote_digest_of_height(
        &self,
        peer: &PeerId,
        height: BlockHeight,
    ) -> Result<Digest, SyncError>;

    /// Encoded block at `height` from the peer.
    async fn get_block_data(
        &self,
        peer: &PeerId,
        height: BlockHeight,
    ) -> Result<RawBlock, SyncError>;

    /// The peer's live chain height.
    async fn query_block_height(&self, peer: &PeerId) -> Result<BlockHeight, SyncError>;
}

/// How `store_incoming` validates a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyMode {
    /// Full validation against the current tip.
    Full,
    /// Fast-sync validation, also checking the lookahead links to the block.
    Lookahead,
}

/// Local block storage and header index.
pub trait BlockStore: Send + Sync {
    /// Height of the local tip.
    fn height(&self) -> BlockHeight;

    /// Digest of the local block at `height`.
    fn digest_for_block(&self, height: BlockHeight) -> Result<Digest, StorageError>;

    /// Drop any cached header/index state.
    fn clear_cache(&self);

    /// Append `block` at tip + 1.
    fn store_incoming(
        &self,
        block: &RawBlock,
        lookahead: Option<&RawBlock>,
        mode: VerifyMode,
    ) -> Result<(), StorageError>;

    /// Delete every block above `height`; `height` becomes the new tip.
    fn delete_down_to_block(&self, height: BlockHeight) -> Result<(), StorageError>;
}

/// Peer registration table of the local node.
pub trait PeerRegistry: Send + Sync {
    /// Every peer currently registered, possibly including ourselves.
    fn registered_peers(&self) -> Vec<PeerDescriptor>;
}

/// Opens metric sessions to peers.
#[async_trait]
pub trait MetricsTransport: Send + Sync {
    /// Open a bounded-lifetime stream to `peer`.
    async fn open_session(&self, peer: &PeerDescriptor) -> Result<Box<dyn PeerSession>, SyncError>;
}

/// One metrics stream with a peer.
#[async_trait]
pub trait PeerSession: Send {
    /// Register the local node with the peer.
    async fn register(&mut self, local: &PeerId) -> Result<(), SyncError>;

    /// The peer's chain height.
    async fn query_height(&mut self) -> Result<BlockHeight, SyncError>;

    /// The peer's digest at `height`.
    async fn query_digest_at(&mut self, height: BlockHeight) -> Result<Digest, SyncError>;

    /// Close the stream.
    async fn close(&mut self);
}
