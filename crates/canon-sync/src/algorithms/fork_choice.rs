//! # Fork Choice
//!
//! Compares the elected remote chain with the local one.

use shared_types::{BlockHeight, Digest};

/// Whether the remote chain should replace or extend the local one.
///
/// A higher remote chain is always better. At equal height the remote chain
/// wins only if its digest is numerically smaller than ours. A lower remote
/// chain never wins.
pub fn has_better_chain(
    remote_height: BlockHeight,
    remote_digest: &Digest,
    local_height: BlockHeight,
    local_digest: &Digest,
) -> bool {
    match remote_height.cmp(&local_height) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Equal => remote_digest < local_digest,
        std::cmp::Ordering::Less => false,
    }
}

/// Same height and same digest.
pub fn is_identical_chain(
    remote_height: BlockHeight,
    remote_digest: &Digest,
    local_height: BlockHeight,
    local_digest: &Digest,
) -> bool {
    remote_height == local_height && remote_digest == local_digest
}
