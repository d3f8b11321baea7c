//! Engine-level behaviour through the public API.

use std::sync::Arc;
use std::time::Duration;

use canon_sync::testing::{test_peer, MockChain, MockMetricsTransport, MockNode, StaticCandidate};
use canon_sync::{
    BlockStore, Candidate, InMemoryBlockStore, StaticPeerRegistry, SyncCollaborators, SyncConfig,
    SyncEngine, SyncState, SyncStatusApi, VerifyMode, Voting, VotingError,
};
use shared_types::{Digest, OperatingMode};

struct Network {
    node: Arc<MockNode>,
    registry: Arc<StaticPeerRegistry>,
    store: Arc<InMemoryBlockStore>,
    engine: SyncEngine,
}

fn network(peers: &[u8], chain: &MockChain) -> Network {
    let node = Arc::new(MockNode::new());
    for &i in peers {
        node.serve(test_peer(i).id, chain.clone());
    }
    node.set_conn_count(peers.len());

    let registry = Arc::new(StaticPeerRegistry::new(
        std::iter::once(0)
            .chain(peers.iter().copied())
            .map(test_peer)
            .collect(),
    ));
    let store = Arc::new(InMemoryBlockStore::with_genesis(
        canon_sync::testing::TEST_GENESIS_SEED,
    ));
    let engine = SyncEngine::init(
        SyncConfig::for_testing(),
        SyncCollaborators {
            local_peer: test_peer(0).id,
            registry: registry.clone(),
            metrics_transport: Arc::new(MockMetricsTransport::new(Arc::clone(&node))),
            node: node.clone(),
            store: store.clone(),
        },
    )
    .unwrap();

    Network {
        node,
        registry,
        store,
        engine,
    }
}

async fn wait_synced_at(engine: &SyncEngine, height: u64) {
    let mut status = engine.subscribe_status();
    loop {
        {
            let s = status.borrow_and_update();
            if s.is_synced() && s.local_height == height {
                return;
            }
        }
        tokio::time::timeout(Duration::from_secs(60), status.changed())
            .await
            .expect("engine made no progress")
            .unwrap();
    }
}

#[test]
fn test_split_vote_elects_majority_bucket() {
    let majority = Digest([0x20; 32]);
    let minority = Digest([0x10; 32]);
    let candidates: Vec<Arc<dyn Candidate>> = vec![
        StaticCandidate::voting(1, 50, majority).arc(),
        StaticCandidate::voting(2, 50, majority).arc(),
        StaticCandidate::voting(3, 50, majority).arc(),
        StaticCandidate::voting(4, 50, minority).arc(),
        StaticCandidate::voting(5, 50, minority).arc(),
    ];

    let mut voting = Voting::new();
    for c in &candidates {
        voting.vote_by(c).unwrap();
    }
    let result = voting.elected_candidate().unwrap();

    assert_eq!(result.digest, majority);
    assert_eq!(result.highest_num_votes, 3);
    assert!(!result.draw);
}

#[test]
fn test_scattered_votes_are_inconclusive() {
    let candidates: Vec<Arc<dyn Candidate>> = (1..=4)
        .map(|i| StaticCandidate::voting(i, 10, Digest([i; 32])).arc())
        .collect();

    let mut voting = Voting::new();
    for c in &candidates {
        voting.vote_by(c).unwrap();
    }

    assert_eq!(
        voting.elected_candidate().unwrap_err(),
        VotingError::InsufficientVotes {
            highest: 1,
            electorate: 4
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_fresh_node_catches_up() {
    let chain = MockChain::build(25, 1);
    let net = network(&[1, 2, 3], &chain);

    net.engine.start().unwrap();
    wait_synced_at(&net.engine, 25).await;

    assert_eq!(net.store.tip_digest(), chain.digest_at(25).unwrap());
    assert_eq!(net.engine.status().state, SyncState::Sampling);
    assert_eq!(net.engine.operating_mode(), OperatingMode::Normal);
    assert_eq!(net.engine.roster().len(), 3);
    net.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_forked_node_rolls_back_to_network_chain() {
    let local = MockChain::build(40, 1);
    let remote = local.fork_from(32, 12, 2);
    let net = network(&[1, 2, 3], &remote);
    for h in 1..=40 {
        net.store
            .store_incoming(local.block_at(h).unwrap(), None, VerifyMode::Full)
            .unwrap();
    }

    net.engine.start().unwrap();
    wait_synced_at(&net.engine, 44).await;

    assert_eq!(net.store.tip_digest(), remote.digest_at(44).unwrap());
    assert_eq!(
        net.store.digest_for_block(33).unwrap(),
        remote.digest_at(33).unwrap()
    );
    assert!(net.store.cache_clears() >= 1);
    net.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_peer_leaves_roster() {
    let chain = MockChain::build(5, 1);
    let net = network(&[1, 2], &chain);

    net.engine.start().unwrap();
    wait_synced_at(&net.engine, 5).await;
    assert_eq!(net.engine.roster().len(), 2);

    assert!(net.registry.unregister(&test_peer(2).id));
    net.engine.metrics_voting().update_candidates();

    let roster = net.engine.roster();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].peer, test_peer(1).id);
    assert!(net.node.block_requests() >= 5);
    net.engine.shutdown().await;
}
