//! # Canon Sync
//!
//! Chain selection and synchronization for a full node.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Decide, under an unreliable or adversarial peer set, which chain is
//! canonical, detect forks against it, and resynchronize local storage:
//! - Peers are polled on a timer for their height and their digest at our height
//! - Each machine cycle runs a fresh election over those cached metrics
//! - The machine walks back to a common ancestor, bounded by a protection window
//! - Blocks are fetched in batches, optionally with a lookahead and random audits
//!
//! ## Machine States
//!
//! | State | Leaves when |
//! |-------|-------------|
//! | Connecting | enough peers are connected |
//! | HighestBlock | an election finds a better or identical chain |
//! | ForkDetect | the common ancestor is found |
//! | FetchBlocks | the elected height is reached |
//! | Rebuild | always, into Sampling |
//! | Sampling | peers drop, or the network is provably ahead |
//!
//! ## Module Structure
//!
//! ```text
//! canon-sync/
//! ├── domain/          # Metrics, states, status, errors, bounds
//! ├── algorithms/      # Voting tally, fork-choice rule
//! ├── ports/           # Status API (inbound) + transport/store traits (outbound)
//! ├── application/     # Roster refresh, machine, context, engine
//! ├── adapters/        # In-memory block store, static peer registry
//! └── config.rs        # SyncConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub(crate) mod metrics;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use adapters::{InMemoryBlockStore, LinkedBlock, StaticPeerRegistry};
pub use algorithms::{has_better_chain, is_identical_chain, ElectionResult, Voter, Voting};
pub use application::{
    Flow, Machine, MetricsPeersVoting, SyncCollaborators, SyncContext, SyncEngine, Transition,
};
pub use config::SyncConfig;
pub use domain::{
    fork_walk_floor, CandidateMetrics, CandidateView, SyncError, SyncState, SyncStatus,
    VotingError, DEFAULT_FORK_PROTECTION, DEFAULT_MIN_CONNECTED_PEERS, MAX_TRANSITIONS_PER_CYCLE,
};
pub use ports::{
    BlockStore, Candidate, CandidateSource, MetricsTransport, NodeTransport, PeerRegistry,
    PeerSession, SyncStatusApi, VerifyMode,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
