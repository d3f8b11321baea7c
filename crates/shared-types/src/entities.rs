//! # Core Chain Entities
//!
//! ## Clusters
//!
//! - **Chain**: `Digest`, `BlockHeight`, `RawBlock`
//! - **Networking**: `PeerId`, `PeerDescriptor`
//! - **Node**: `OperatingMode`

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// Height of a block in the chain. Genesis is height 0.
pub type BlockHeight = u64;

/// A 32-byte block digest.
///
/// Digests are totally ordered as unsigned 256-bit big-endian integers. The
/// derived `Ord` on the byte array is exactly that order, which is what the
/// fork-choice tie-break relies on: the numerically smaller digest wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// The all-zero digest.
    pub const ZERO: Digest = Digest([0u8; 32]);

    /// Wrap raw digest bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The digest interpreted as a big-endian 256-bit integer.
    pub fn as_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, crate::ChainTypeError> {
        decode_hex32(s).map(Self)
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Opaque serialized block as exchanged with peers and handed to storage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawBlock(pub Vec<u8>);

impl RawBlock {
    /// Borrow the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RawBlock {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Decode 32 hex-encoded bytes, with or without a `0x` prefix.
fn decode_hex32(s: &str) -> Result<[u8; 32], crate::ChainTypeError> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| crate::ChainTypeError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| crate::ChainTypeError::InvalidLength(len))
}

// =============================================================================
// CLUSTER B: NETWORKING
// =============================================================================

/// Unique identifier for a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, crate::ChainTypeError> {
        decode_hex32(s).map(Self)
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A peer as listed in the local node's registration table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// The peer's node ID.
    pub id: PeerId,
    /// Network address (IP:Port).
    pub address: String,
    /// Human readable node name, as announced at registration.
    pub name: String,
}

impl PeerDescriptor {
    /// Create a descriptor.
    pub fn new(id: PeerId, address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            name: name.into(),
        }
    }
}

// =============================================================================
// CLUSTER C: NODE
// =============================================================================

/// Node-wide operating mode, switched by the synchronization engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Catching up with the network; block production and relay hold off.
    #[default]
    Syncing,
    /// Local chain matches the elected canonical chain.
    Normal,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Syncing => write!(f, "syncing"),
            OperatingMode::Normal => write!(f, "normal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_with(first: u8, last: u8) -> Digest {
        let mut bytes = [0u8; 32];
        bytes[0] = first;
        bytes[31] = last;
        Digest(bytes)
    }

    #[test]
    fn test_digest_order_is_numeric_big_endian() {
        let small = digest_with(0x01, 0xff);
        let large = digest_with(0x02, 0x00);
        assert!(small < large);
        assert!(small.as_u256() < large.as_u256());
    }

    #[test]
    fn test_digest_hex_round_trip() {
        let d = digest_with(0xab, 0xcd);
        let parsed = Digest::from_hex(&d.to_string()).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn test_digest_from_hex_rejects_short_input() {
        let err = Digest::from_hex("abcd").unwrap_err();
        assert!(matches!(err, crate::ChainTypeError::InvalidLength(2)));
    }

    #[test]
    fn test_peer_id_from_hex() {
        let id = PeerId([0x5a; 32]);
        assert_eq!(PeerId::from_hex(&id.to_string()).unwrap(), id);
        assert_eq!(PeerId::from_hex(&format!("0x{id}")).unwrap(), id);
        assert!(matches!(
            PeerId::from_hex("zz"),
            Err(crate::ChainTypeError::InvalidHex(_))
        ));
        assert!(matches!(
            PeerId::from_hex("abcd"),
            Err(crate::ChainTypeError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_operating_mode_default_is_syncing() {
        assert_eq!(OperatingMode::default(), OperatingMode::Syncing);
        assert_eq!(OperatingMode::Normal.to_string(), "normal");
    }

    #[test]
    fn test_peer_descriptor_serde() {
        let peer = PeerDescriptor::new(PeerId([7u8; 32]), "10.0.0.1:30303", "alpha");
        let json = serde_json::to_string(&peer).unwrap();
        let back: PeerDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, peer);
    }
}
