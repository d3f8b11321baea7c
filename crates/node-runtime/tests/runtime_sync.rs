//! Runtime wiring against simulated peers.

use std::sync::Arc;
use std::time::Duration;

use canon_sync::testing::{test_peer, MockChain, MockMetricsTransport, MockNode, TEST_GENESIS_SEED};
use canon_sync::{BlockStore, SyncConfig, SyncState};
use node_runtime::{NodeConfig, NodeContainer, NodeRuntime};
use shared_types::OperatingMode;

fn config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.sync = SyncConfig::for_testing();
    config.storage.genesis_seed = String::from_utf8(TEST_GENESIS_SEED.to_vec()).unwrap();
    config.network.local_peer_id = test_peer(0).id.to_string();
    config
}

#[tokio::test(start_paused = true)]
async fn test_runtime_syncs_from_registered_peers() {
    let chain = MockChain::build(18, 3);
    let node = Arc::new(MockNode::new());
    for i in 1..=2 {
        node.serve(test_peer(i).id, chain.clone());
    }
    node.set_conn_count(2);

    let container = NodeContainer::with_transports(
        config(),
        node.clone(),
        Arc::new(MockMetricsTransport::new(node.clone())),
    )
    .unwrap();
    container.registry.register(test_peer(1));
    container.registry.register(test_peer(2));
    let runtime = NodeRuntime::from_container(container);

    runtime.start().unwrap();
    let mut status = runtime.container().engine.subscribe_status();
    tokio::time::timeout(Duration::from_secs(120), async {
        while !status.borrow_and_update().is_synced() {
            status.changed().await.unwrap();
        }
    })
    .await
    .expect("runtime did not sync");

    let container = runtime.container();
    assert_eq!(container.store.height(), 18);
    assert_eq!(container.store.tip_digest(), chain.digest_at(18).unwrap());
    assert_eq!(runtime.status().state, SyncState::Sampling);
    assert_eq!(runtime.status().operating_mode, OperatingMode::Normal);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_mismatched_genesis_never_syncs() {
    let chain = MockChain::build(5, 3);
    let node = Arc::new(MockNode::new());
    node.serve(test_peer(1).id, chain);
    node.set_conn_count(1);

    let mut config = config();
    config.storage.genesis_seed = "another-network".into();
    let container = NodeContainer::with_transports(
        config,
        node.clone(),
        Arc::new(MockMetricsTransport::new(node.clone())),
    )
    .unwrap();
    container.registry.register(test_peer(1));
    let runtime = NodeRuntime::from_container(container);

    runtime.start().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(runtime.container().store.height(), 0);
    runtime.shutdown().await;
}
