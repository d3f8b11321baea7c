//! # Domain Errors
//!
//! Error types for chain selection and synchronization.
//!
//! Three families:
//! - transient peer/storage failures, folded into a re-election by the machine
//! - voting outcomes that elect nothing, which are expected
//! - invariant violations, which force a machine reset

use shared_types::{BlockHeight, Digest, PeerId, StorageError};
use thiserror::Error;

/// Outcomes of an election that produce no actionable winner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VotingError {
    /// No bucket reached a majority of the electorate.
    #[error("Insufficient votes: best bucket has {highest} of {electorate}")]
    InsufficientVotes {
        /// Votes in the largest bucket
        highest: usize,
        /// Candidates offered this round
        electorate: usize,
    },

    /// The winning bucket held no voters.
    #[error("Winning bucket {0} is empty")]
    EmptyWinner(Digest),
}

/// Sync engine error types.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure talking to a peer.
    #[error("Network error: {0}")]
    Network(String),

    /// A bounded request ran past its deadline.
    #[error("Timed out during {operation} with {peer}")]
    Timeout {
        /// Request being made
        operation: &'static str,
        /// Remote address or peer id
        peer: String,
    },

    /// Local block store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Election produced no winner.
    #[error("Voting error: {0}")]
    Voting(#[from] VotingError),

    /// A roster member has no metrics record.
    #[error("Invariant violated: no metrics recorded for candidate {0}")]
    InvariantMissingMetrics(PeerId),

    /// A transition that needs a target ran without one.
    #[error("Invariant violated: no target candidate in {0}")]
    InvariantNoTarget(&'static str),

    /// No common ancestor inside the fork-protection window.
    #[error("No common ancestor between {local_height} and floor {floor}")]
    ForkBeyondProtection {
        /// Local height when the walk started
        local_height: BlockHeight,
        /// Lowest height the walk was allowed to inspect
        floor: BlockHeight,
    },

    /// Peer is not on the roster.
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The engine was started twice.
    #[error("Sync engine already started")]
    AlreadyStarted,
}

impl SyncError {
    /// Corruption of engine-owned data rather than a peer or I/O failure.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            SyncError::InvariantMissingMetrics(_) | SyncError::InvariantNoTarget(_)
        )
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Network(_) => "network",
            SyncError::Timeout { .. } => "timeout",
            SyncError::Storage(_) => "storage",
            SyncError::Voting(_) => "voting",
            SyncError::InvariantMissingMetrics(_) | SyncError::InvariantNoTarget(_) => {
                "invariant"
            }
            SyncError::ForkBeyondProtection { .. } => "fork_protection",
            SyncError::UnknownPeer(_) => "unknown_peer",
            SyncError::Config(_) => "config",
            SyncError::AlreadyStarted => "already_started",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_votes_error() {
        let err = VotingError::InsufficientVotes {
            highest: 1,
            electorate: 5,
        };
        assert!(err.to_string().contains("1 of 5"));
    }

    #[test]
    fn test_invariant_classification() {
        assert!(SyncError::InvariantMissingMetrics(PeerId([1; 32])).is_invariant_violation());
        assert!(SyncError::InvariantNoTarget("fork_detect").is_invariant_violation());
        assert!(!SyncError::Network("reset".into()).is_invariant_violation());
        assert!(!SyncError::Timeout {
            operation: "get_block_data",
            peer: "10.0.0.1:30303".into()
        }
        .is_invariant_violation());
    }

    #[test]
    fn test_storage_error_converts() {
        let err: SyncError = StorageError::NotFound(42).into();
        assert_eq!(err.kind(), "storage");
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_fork_beyond_protection_error() {
        let err = SyncError::ForkBeyondProtection {
            local_height: 500,
            floor: 400,
        };
        assert!(err.to_string().contains("floor 400"));
    }
}
