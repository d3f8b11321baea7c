//! # Domain Invariants
//!
//! Constants and bounds the machine must respect.

use shared_types::BlockHeight;

/// Default minimum connected peers before syncing.
pub const DEFAULT_MIN_CONNECTED_PEERS: usize = 3;

/// Default fork-protection window in blocks.
pub const DEFAULT_FORK_PROTECTION: u64 = 100;

/// Upper bound on transitions chained inside one cycle.
pub const MAX_TRANSITIONS_PER_CYCLE: usize = 64;

/// Lowest height a fork walk from `local_height` may inspect.
///
/// The walk never rolls storage back more than `fork_protection` blocks.
pub fn fork_walk_floor(local_height: BlockHeight, fork_protection: u64) -> BlockHeight {
    local_height.saturating_sub(fork_protection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_walk_floor() {
        assert_eq!(fork_walk_floor(500, 100), 400);
        assert_eq!(fork_walk_floor(30, 100), 0);
    }
}
