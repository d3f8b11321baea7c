//! In-Memory Block Store
//!
//! Implements the `BlockStore` port over a vector of linked blocks.
//!
//! Block layout: the first 32 bytes are the parent digest, the rest is an
//! opaque payload. A block's digest is the SHA-256 of its full encoding.

use parking_lot::RwLock;
use sha2::{Digest as _, Sha256};
use shared_types::{BlockHeight, Digest, RawBlock, StorageError};
use tracing::debug;

use crate::ports::{BlockStore, VerifyMode};

/// Encoding helpers for the linked block layout.
pub struct LinkedBlock;

impl LinkedBlock {
    /// Encode a block on top of `parent`.
    pub fn encode(parent: &Digest, payload: &[u8]) -> RawBlock {
        let mut bytes = Vec::with_capacity(32 + payload.len());
        bytes.extend_from_slice(parent.as_bytes());
        bytes.extend_from_slice(payload);
        RawBlock(bytes)
    }

    /// Parent digest, if the block is long enough to carry one.
    pub fn parent_of(block: &RawBlock) -> Option<Digest> {
        let head: [u8; 32] = block.as_bytes().get(..32)?.try_into().ok()?;
        Some(Digest(head))
    }

    /// SHA-256 of the encoded block.
    pub fn digest_of(block: &RawBlock) -> Digest {
        let hash = Sha256::digest(block.as_bytes());
        Digest(hash.into())
    }

    /// Genesis block derived from `seed`.
    pub fn genesis(seed: &[u8]) -> RawBlock {
        Self::encode(&Digest::ZERO, seed)
    }
}

struct StoredBlock {
    digest: Digest,
    data: RawBlock,
}

struct StoreInner {
    blocks: Vec<StoredBlock>,
    cache_clears: u64,
}

/// Reference `BlockStore` keeping every block in memory.
pub struct InMemoryBlockStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryBlockStore {
    /// Store holding only `genesis` at height 0.
    pub fn new(genesis: RawBlock) -> Self {
        let digest = LinkedBlock::digest_of(&genesis);
        Self {
            inner: RwLock::new(StoreInner {
                blocks: vec![StoredBlock {
                    digest,
                    data: genesis,
                }],
                cache_clears: 0,
            }),
        }
    }

    /// Store whose genesis is derived from `seed`.
    pub fn with_genesis(seed: &[u8]) -> Self {
        Self::new(LinkedBlock::genesis(seed))
    }

    /// Number of times `clear_cache` ran.
    pub fn cache_clears(&self) -> u64 {
        self.inner.read().cache_clears
    }

    /// Encoded block at `height`.
    pub fn block_at(&self, height: BlockHeight) -> Option<RawBlock> {
        self.inner
            .read()
            .blocks
            .get(height as usize)
            .map(|b| b.data.clone())
    }

    /// Digest of the local tip.
    pub fn tip_digest(&self) -> Digest {
        let inner = self.inner.read();
        inner
            .blocks
            .last()
            .map(|b| b.digest)
            .unwrap_or(Digest::ZERO)
    }
}

impl BlockStore for InMemoryBlockStore {
    fn height(&self) -> BlockHeight {
        self.inner.read().blocks.len().saturating_sub(1) as BlockHeight
    }

    fn digest_for_block(&self, height: BlockHeight) -> Result<Digest, StorageError> {
        let inner = self.inner.read();
        inner
            .blocks
            .get(height as usize)
            .map(|b| b.digest)
            .ok_or(StorageError::NotFound(height))
    }

    fn clear_cache(&self) {
        self.inner.write().cache_clears += 1;
    }

    fn store_incoming(
        &self,
        block: &RawBlock,
        lookahead: Option<&RawBlock>,
        mode: VerifyMode,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let height = inner.blocks.len() as BlockHeight;
        let tip = inner.blocks.last().map(|b| b.digest).unwrap_or(Digest::ZERO);

        let parent = LinkedBlock::parent_of(block).ok_or_else(|| StorageError::Rejected {
            height,
            reason: format!("block too short ({} bytes)", block.len()),
        })?;
        if parent != tip {
            return Err(StorageError::Rejected {
                height,
                reason: format!("parent {} does not match tip {}", parent.short(), tip.short()),
            });
        }

        let digest = LinkedBlock::digest_of(block);
        if mode == VerifyMode::Lookahead {
            if let Some(next) = lookahead {
                if LinkedBlock::parent_of(next) != Some(digest) {
                    return Err(StorageError::Rejected {
                        height,
                        reason: "lookahead does not extend block".to_string(),
                    });
                }
            }
        }

        inner.blocks.push(StoredBlock {
            digest,
            data: block.clone(),
        });
        debug!(height, digest = %digest.short(), "Stored block");
        Ok(())
    }

    fn delete_down_to_block(&self, height: BlockHeight) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let tip = inner.blocks.len().saturating_sub(1) as BlockHeight;
        if height > tip {
            return Err(StorageError::RollbackAboveTip { target: height, tip });
        }
        inner.blocks.truncate(height as usize + 1);
        Ok(())
    }
}
