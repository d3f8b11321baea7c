//! Static Peer Registry
//!
//! Implements `PeerRegistry` over a fixed, editable list of peers.

use parking_lot::RwLock;
use shared_types::{PeerDescriptor, PeerId};
use tracing::info;

use crate::ports::PeerRegistry;

/// Registration table backed by a list.
#[derive(Default)]
pub struct StaticPeerRegistry {
    peers: RwLock<Vec<PeerDescriptor>>,
}

impl StaticPeerRegistry {
    /// Registry holding `peers`.
    pub fn new(peers: Vec<PeerDescriptor>) -> Self {
        Self {
            peers: RwLock::new(peers),
        }
    }

    /// Register a peer, replacing any entry with the same id.
    pub fn register(&self, peer: PeerDescriptor) {
        let mut peers = self.peers.write();
        peers.retain(|p| p.id != peer.id);
        info!("[sync] Registered peer {} at {}", peer.name, peer.address);
        peers.push(peer);
    }

    /// Remove a peer. Returns whether it was present.
    pub fn unregister(&self, id: &PeerId) -> bool {
        let mut peers = self.peers.write();
        let before = peers.len();
        peers.retain(|p| &p.id != id);
        peers.len() != before
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl PeerRegistry for StaticPeerRegistry {
    fn registered_peers(&self) -> Vec<PeerDescriptor> {
        self.peers.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(i: u8) -> PeerDescriptor {
        PeerDescriptor::new(PeerId([i; 32]), format!("10.0.0.{i}:30303"), format!("node-{i}"))
    }

    #[test]
    fn test_register_replaces_same_id() {
        let registry = StaticPeerRegistry::new(vec![peer(1)]);
        let mut moved = peer(1);
        moved.address = "10.0.1.1:30303".to_string();
        registry.register(moved);
        registry.register(peer(2));

        let peers = registry.registered_peers();
        assert_eq!(peers.len(), 2);
        assert!(peers.iter().any(|p| p.address == "10.0.1.1:30303"));
    }

    #[test]
    fn test_unregister() {
        let registry = StaticPeerRegistry::new(vec![peer(1), peer(2)]);
        assert!(registry.unregister(&PeerId([1; 32])));
        assert!(!registry.unregister(&PeerId([1; 32])));
        assert_eq!(registry.len(), 1);
    }
}
