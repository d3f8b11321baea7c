//! # Inbound Ports
//!
//! What the rest of the node may ask the sync engine.

use shared_types::OperatingMode;

use crate::domain::{CandidateView, SyncStatus};

/// Sync status API - inbound port.
pub trait SyncStatusApi: Send + Sync {
    /// Latest published machine snapshot.
    fn status(&self) -> SyncStatus;

    /// Current node-wide operating mode.
    fn operating_mode(&self) -> OperatingMode;

    /// Current roster with cached metrics.
    fn roster(&self) -> Vec<CandidateView>;

    /// Check if the node is synced.
    fn is_synced(&self) -> bool {
        self.operating_mode() == OperatingMode::Normal
    }
}
