//! # Test Doubles
//!
//! In-process chains, a scriptable network node, metric sessions and static
//! candidates. Exported for downstream tests behind the `test-utils` feature.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{BlockHeight, Digest, PeerDescriptor, PeerId, RawBlock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;

use crate::adapters::LinkedBlock;
use crate::domain::{CandidateMetrics, SyncError};
use crate::ports::{
    Candidate, CandidateSource, MetricsTransport, NodeTransport, PeerSession,
};

/// Genesis seed shared by every mock chain and test store.
pub const TEST_GENESIS_SEED: &[u8] = b"canon-test-genesis";

/// Descriptor for test peer `index`.
pub fn test_peer(index: u8) -> PeerDescriptor {
    PeerDescriptor::new(
        PeerId([index; 32]),
        format!("10.0.0.{index}:30303"),
        format!("node-{index}"),
    )
}

// =============================================================================
// Chains
// =============================================================================

/// A linked chain of blocks starting at the test genesis.
#[derive(Clone, Debug)]
pub struct MockChain {
    blocks: Vec<RawBlock>,
    digests: Vec<Digest>,
}

impl MockChain {
    /// Genesis plus `len` blocks whose payloads are tagged with `salt`.
    pub fn build(len: u64, salt: u8) -> Self {
        let genesis = LinkedBlock::genesis(TEST_GENESIS_SEED);
        let mut chain = Self {
            digests: vec![LinkedBlock::digest_of(&genesis)],
            blocks: vec![genesis],
        };
        chain.extend(len, salt);
        chain
    }

    /// Copy of this chain up to `height`, then `extra` new blocks tagged `salt`.
    pub fn fork_from(&self, height: BlockHeight, extra: u64, salt: u8) -> Self {
        let keep = (height as usize + 1).min(self.blocks.len());
        let mut chain = Self {
            blocks: self.blocks[..keep].to_vec(),
            digests: self.digests[..keep].to_vec(),
        };
        chain.extend(extra, salt);
        chain
    }

    /// Append `count` blocks tagged `salt`.
    pub fn extend(&mut self, count: u64, salt: u8) {
        for _ in 0..count {
            let height = self.blocks.len() as u64;
            let parent = self.digests[self.digests.len() - 1];
            let mut payload = vec![salt];
            payload.extend_from_slice(&height.to_be_bytes());
            let block = LinkedBlock::encode(&parent, &payload);
            self.digests.push(LinkedBlock::digest_of(&block));
            self.blocks.push(block);
        }
    }

    /// Tip height.
    pub fn height(&self) -> BlockHeight {
        self.blocks.len() as BlockHeight - 1
    }

    /// Block at `height`.
    pub fn block_at(&self, height: BlockHeight) -> Option<&RawBlock> {
        self.blocks.get(height as usize)
    }

    /// Digest at `height`.
    pub fn digest_at(&self, height: BlockHeight) -> Option<Digest> {
        self.digests.get(height as usize).copied()
    }
}

// =============================================================================
// Network node
// =============================================================================

#[derive(Default)]
struct MockNodeState {
    conn_count: usize,
    chains: HashMap<PeerId, MockChain>,
    failing: HashSet<PeerId>,
    stalled: HashSet<PeerId>,
    forged_from: HashMap<PeerId, BlockHeight>,
    block_requests: u64,
    digest_requests: u64,
}

/// Scriptable `NodeTransport`.
///
/// Each peer serves a [`MockChain`]. Peers can be made to fail, to stall
/// forever, or to lie about digests from some height upward.
#[derive(Default)]
pub struct MockNode {
    state: Mutex<MockNodeState>,
}

impl MockNode {
    /// Node with no peers and no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connected-peer count.
    pub fn set_conn_count(&self, count: usize) {
        self.state.lock().conn_count = count;
    }

    /// Make `peer` serve `chain`.
    pub fn serve(&self, peer: PeerId, chain: MockChain) {
        self.state.lock().chains.insert(peer, chain);
    }

    /// Make every request to `peer` fail.
    pub fn fail(&self, peer: PeerId) {
        self.state.lock().failing.insert(peer);
    }

    /// Make every request to `peer` hang.
    pub fn stall(&self, peer: PeerId) {
        self.state.lock().stalled.insert(peer);
    }

    /// Clear failure and stall flags for `peer`.
    pub fn heal(&self, peer: PeerId) {
        let mut state = self.state.lock();
        state.failing.remove(&peer);
        state.stalled.remove(&peer);
    }

    /// Make `peer` report bogus digests at `height` and above.
    pub fn forge_digests_from(&self, peer: PeerId, height: BlockHeight) {
        self.state.lock().forged_from.insert(peer, height);
    }

    /// Blocks served so far.
    pub fn block_requests(&self) -> u64 {
        self.state.lock().block_requests
    }

    /// Digest queries served so far.
    pub fn digest_requests(&self) -> u64 {
        self.state.lock().digest_requests
    }

    async fn chain_for(&self, peer: &PeerId) -> Result<MockChain, SyncError> {
        let stalled = self.state.lock().stalled.contains(peer);
        if stalled {
            std::future::pending::<()>().await;
        }
        let state = self.state.lock();
        if state.failing.contains(peer) {
            return Err(SyncError::Network(format!("peer {} unreachable", peer.short())));
        }
        state
            .chains
            .get(peer)
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("peer {} not connected", peer.short())))
    }

    fn digest_of(&self, peer: &PeerId, chain: &MockChain, height: BlockHeight) -> Result<Digest, SyncError> {
        let mut state = self.state.lock();
        state.digest_requests += 1;
        if let Some(from) = state.forged_from.get(peer) {
            if height >= *from {
                let mut bogus = [0xee; 32];
                bogus[..8].copy_from_slice(&height.to_be_bytes());
                return Ok(Digest(bogus));
            }
        }
        chain
            .digest_at(height)
            .ok_or_else(|| SyncError::Network(format!("no block at {height}")))
    }
}

#[async_trait]
impl NodeTransport for MockNode {
    fn conn_count(&self) -> usize {
        self.state.lock().conn_count
    }

    async fn remote_digest_of_height(
        &self,
        peer: &PeerId,
        height: BlockHeight,
    ) -> Result<Digest, SyncError> {
        let chain = self.chain_for(peer).await?;
        self.digest_of(peer, &chain, height)
    }

    async fn get_block_data(
        &self,
        peer: &PeerId,
        height: BlockHeight,
    ) -> Result<RawBlock, SyncError> {
        let chain = self.chain_for(peer).await?;
        self.state.lock().block_requests += 1;
        chain
            .block_at(height)
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("no block at {height}")))
    }

    async fn query_block_height(&self, peer: &PeerId) -> Result<BlockHeight, SyncError> {
        Ok(self.chain_for(peer).await?.height())
    }
}

// =============================================================================
// Metric sessions
// =============================================================================

/// `MetricsTransport` answering from a [`MockNode`].
pub struct MockMetricsTransport {
    node: Arc<MockNode>,
    sessions_opened: Mutex<u64>,
    registrations: Arc<Mutex<Vec<(PeerId, PeerId)>>>,
}

impl MockMetricsTransport {
    /// Transport backed by `node`.
    pub fn new(node: Arc<MockNode>) -> Self {
        Self {
            node,
            sessions_opened: Mutex::new(0),
            registrations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sessions opened so far.
    pub fn sessions_opened(&self) -> u64 {
        *self.sessions_opened.lock()
    }

    /// `(remote, local)` pairs registered so far.
    pub fn registrations(&self) -> Vec<(PeerId, PeerId)> {
        self.registrations.lock().clone()
    }
}

#[async_trait]
impl MetricsTransport for MockMetricsTransport {
    async fn open_session(&self, peer: &PeerDescriptor) -> Result<Box<dyn PeerSession>, SyncError> {
        *self.sessions_opened.lock() += 1;
        Ok(Box::new(MockPeerSession {
            peer: peer.id,
            node: Arc::clone(&self.node),
            registrations: Arc::clone(&self.registrations),
            registered: false,
            closed: false,
        }))
    }
}

/// One session opened by [`MockMetricsTransport`].
pub struct MockPeerSession {
    peer: PeerId,
    node: Arc<MockNode>,
    registrations: Arc<Mutex<Vec<(PeerId, PeerId)>>>,
    registered: bool,
    closed: bool,
}

impl MockPeerSession {
    fn check_open(&self) -> Result<(), SyncError> {
        if self.closed {
            return Err(SyncError::Network("session closed".into()));
        }
        if !self.registered {
            return Err(SyncError::Network("query before register".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerSession for MockPeerSession {
    async fn register(&mut self, local: &PeerId) -> Result<(), SyncError> {
        self.node.chain_for(&self.peer).await?;
        self.registrations.lock().push((self.peer, *local));
        self.registered = true;
        Ok(())
    }

    async fn query_height(&mut self) -> Result<BlockHeight, SyncError> {
        self.check_open()?;
        Ok(self.node.chain_for(&self.peer).await?.height())
    }

    async fn query_digest_at(&mut self, height: BlockHeight) -> Result<Digest, SyncError> {
        self.check_open()?;
        let chain = self.node.chain_for(&self.peer).await?;
        self.node.digest_of(&self.peer, &chain, height)
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

// =============================================================================
// Candidates
// =============================================================================

/// Candidate with fixed metrics.
pub struct StaticCandidate {
    id: PeerId,
    address: String,
    metrics: Option<CandidateMetrics>,
}

impl StaticCandidate {
    /// Candidate `index` with explicit metrics.
    pub fn new(index: u8, address: impl Into<String>, metrics: CandidateMetrics) -> Self {
        Self {
            id: PeerId([index; 32]),
            address: address.into(),
            metrics: Some(metrics),
        }
    }

    /// Candidate `index` claiming `digest` at a local height equal to `height`.
    pub fn voting(index: u8, height: BlockHeight, digest: Digest) -> Self {
        Self::new(
            index,
            format!("10.0.0.{index}:30303"),
            CandidateMetrics {
                name: format!("node-{index}"),
                remote_height: height,
                local_height_at_request_time: height,
                remote_digest_of_local_height: Some(digest),
                last_response_time: Some(Instant::now()),
            },
        )
    }

    /// Candidate whose digest was measured at local height `at`.
    pub fn measured_at(mut self, at: BlockHeight) -> Self {
        if let Some(metrics) = self.metrics.as_mut() {
            metrics.local_height_at_request_time = at;
        }
        self
    }

    /// Candidate with no metrics record at all.
    pub fn without_metrics(index: u8) -> Self {
        Self {
            id: PeerId([index; 32]),
            address: format!("10.0.0.{index}:30303"),
            metrics: None,
        }
    }

    /// Erase into a shared trait object.
    pub fn arc(self) -> Arc<dyn Candidate> {
        Arc::new(self)
    }
}

impl Candidate for StaticCandidate {
    fn peer_id(&self) -> PeerId {
        self.id
    }

    fn remote_addr(&self) -> String {
        self.address.clone()
    }

    fn name(&self) -> String {
        self.metrics
            .as_ref()
            .map(|m| m.name.clone())
            .unwrap_or_default()
    }

    fn metrics(&self) -> Result<CandidateMetrics, SyncError> {
        self.metrics
            .clone()
            .ok_or(SyncError::InvariantMissingMetrics(self.id))
    }
}

/// `CandidateSource` over a replaceable list.
#[derive(Default)]
pub struct StaticRoster {
    candidates: RwLock<Vec<Arc<dyn Candidate>>>,
}

impl StaticRoster {
    /// Roster holding `candidates`.
    pub fn new(candidates: Vec<Arc<dyn Candidate>>) -> Self {
        Self {
            candidates: RwLock::new(candidates),
        }
    }

    /// Replace the roster.
    pub fn replace(&self, candidates: Vec<Arc<dyn Candidate>>) {
        *self.candidates.write() = candidates;
    }
}

impl CandidateSource for StaticRoster {
    fn candidates(&self) -> Vec<Arc<dyn Candidate>> {
        self.candidates.read().clone()
    }
}

/// Candidates `first..first + count` all voting for `chain` as seen from
/// local height `local_height`.
pub fn candidates_on(
    chain: &MockChain,
    local_height: BlockHeight,
    first: u8,
    count: u8,
) -> Vec<Arc<dyn Candidate>> {
    let digest = chain.digest_at(local_height).unwrap_or(Digest::ZERO);
    (first..first + count)
        .map(|i| {
            StaticCandidate::voting(i, chain.height(), digest)
                .measured_at(local_height)
                .arc()
        })
        .collect()
}
