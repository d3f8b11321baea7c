//! # Domain Entities
//!
//! Per-peer metrics, machine states and the status snapshot published after
//! every transition.

use serde::{Deserialize, Serialize};
use shared_types::{BlockHeight, Digest, OperatingMode, PeerId};
use std::fmt;
use tokio::time::Instant;

/// Cached view of one remote peer, refreshed by the roster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateMetrics {
    /// Name announced by the peer.
    pub name: String,
    /// Height the peer reported.
    pub remote_height: BlockHeight,
    /// Local height when the digest query was sent.
    pub local_height_at_request_time: BlockHeight,
    /// The peer's digest at `local_height_at_request_time`.
    ///
    /// `None` until a refresh succeeds, or when the peer was below our height
    /// and could not answer.
    pub remote_digest_of_local_height: Option<Digest>,
    /// When the last successful refresh completed.
    pub last_response_time: Option<Instant>,
}

impl CandidateMetrics {
    /// Record with only a name, as created when a peer joins the roster.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether the last refresh is older than `max_age` (or never happened).
    pub fn is_stale(&self, now: Instant, max_age: std::time::Duration) -> bool {
        match self.last_response_time {
            Some(at) => now.saturating_duration_since(at) > max_age,
            None => true,
        }
    }
}

/// Machine states. Closed set; initial state is `Connecting`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    /// Waiting for enough connected peers.
    #[default]
    Connecting,
    /// Electing the best chain and comparing it with ours.
    HighestBlock,
    /// Locating the common ancestor with the elected chain.
    ForkDetect,
    /// Pulling blocks from the elected peer.
    FetchBlocks,
    /// Target reached; switching to normal operation.
    Rebuild,
    /// Steady state; periodic re-election.
    Sampling,
}

impl SyncState {
    /// Stable ordinal for the state gauge.
    pub fn code(self) -> i64 {
        match self {
            SyncState::Connecting => 0,
            SyncState::HighestBlock => 1,
            SyncState::ForkDetect => 2,
            SyncState::FetchBlocks => 3,
            SyncState::Rebuild => 4,
            SyncState::Sampling => 5,
        }
    }

    /// snake_case label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Connecting => "connecting",
            SyncState::HighestBlock => "highest_block",
            SyncState::ForkDetect => "fork_detect",
            SyncState::FetchBlocks => "fetch_blocks",
            SyncState::Rebuild => "rebuild",
            SyncState::Sampling => "sampling",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the machine, published over a watch channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Current state.
    pub state: SyncState,
    /// Local chain height.
    pub local_height: BlockHeight,
    /// Elected height being synced to (0 when none).
    pub target_height: BlockHeight,
    /// Remote address of the elected peer.
    pub target_peer: Option<String>,
    /// Whether fast sync is still enabled.
    pub fast_sync_enabled: bool,
    /// Node-wide operating mode.
    pub operating_mode: OperatingMode,
    /// Consecutive samples spent behind the network.
    pub sample_count: u32,
}

impl SyncStatus {
    /// Whether the node has caught up.
    pub fn is_synced(&self) -> bool {
        self.operating_mode == OperatingMode::Normal
    }

    /// Progress towards the target in `[0.0, 1.0]`.
    pub fn progress(&self) -> f64 {
        if self.target_height == 0 || self.local_height >= self.target_height {
            return 1.0;
        }
        self.local_height as f64 / self.target_height as f64
    }
}

/// Read-only roster entry for inspection.
#[derive(Clone, Debug)]
pub struct CandidateView {
    /// Peer identity.
    pub peer: PeerId,
    /// Remote address.
    pub address: String,
    /// Cached metrics.
    pub metrics: CandidateMetrics,
    /// Whether the metrics are too old to vote.
    pub stale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_state_codes_are_distinct() {
        let states = [
            SyncState::Connecting,
            SyncState::HighestBlock,
            SyncState::ForkDetect,
            SyncState::FetchBlocks,
            SyncState::Rebuild,
            SyncState::Sampling,
        ];
        for (i, s) in states.iter().enumerate() {
            assert_eq!(s.code(), i as i64);
        }
        assert_eq!(SyncState::default(), SyncState::Connecting);
        assert_eq!(SyncState::ForkDetect.to_string(), "fork_detect");
    }

    #[test]
    fn test_metrics_staleness() {
        let now = Instant::now();
        let mut metrics = CandidateMetrics::named("alpha");
        assert!(metrics.is_stale(now, Duration::from_secs(30)));

        metrics.last_response_time = Some(now);
        assert!(!metrics.is_stale(now + Duration::from_secs(10), Duration::from_secs(30)));
        assert!(metrics.is_stale(now + Duration::from_secs(31), Duration::from_secs(30)));
    }

    #[test]
    fn test_status_progress() {
        let status = SyncStatus {
            local_height: 50,
            target_height: 100,
            ..Default::default()
        };
        assert!((status.progress() - 0.5).abs() < f64::EPSILON);
        assert!(!status.is_synced());
    }
}
