//! # Sync Configuration
//!
//! Plain injectable constants for the sync engine. Durations are stored as
//! whole seconds or milliseconds so the struct round-trips through TOML.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{SyncError, DEFAULT_FORK_PROTECTION, DEFAULT_MIN_CONNECTED_PEERS};

/// Sync engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Connected peers required before leaving `Connecting`.
    pub min_connected_peers: usize,

    /// Machine cycle timer in milliseconds.
    pub cycle_interval_ms: u64,

    /// Maximum number of blocks a fork walk may roll back.
    pub fork_protection: u64,

    /// Blocks pulled per `FetchBlocks` transition.
    pub fetch_batch_size: u64,

    /// Pipeline one lookahead block and audit periodically.
    pub fast_sync_enabled: bool,

    /// Audit one random fetched block every this many fast-synced blocks.
    pub audit_interval: u64,

    /// Consecutive behind-samples tolerated before forcing `ForkDetect`.
    pub sampling_limit: u32,

    /// Interval between roster metric refreshes, in seconds.
    pub metrics_refresh_interval_secs: u64,

    /// Deadline for one full metrics round trip, in seconds.
    pub metrics_round_trip_timeout_secs: u64,

    /// Deadline for one Node request (digest, block, height), in seconds.
    pub request_timeout_secs: u64,

    /// Metrics older than this are stale and excluded from elections, in
    /// seconds. Zero means three refresh intervals.
    pub stale_after_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_connected_peers: DEFAULT_MIN_CONNECTED_PEERS,
            cycle_interval_ms: 1_000,
            fork_protection: DEFAULT_FORK_PROTECTION,
            fetch_batch_size: 64,
            fast_sync_enabled: true,
            audit_interval: 256,
            sampling_limit: 5,
            metrics_refresh_interval_secs: 10,
            metrics_round_trip_timeout_secs: 30,
            request_timeout_secs: 10,
            stale_after_secs: 0,
        }
    }
}

impl SyncConfig {
    /// Create a config for testing (small windows, fast timers).
    pub fn for_testing() -> Self {
        Self {
            min_connected_peers: 1,
            cycle_interval_ms: 10,
            fork_protection: 20,
            fetch_batch_size: 8,
            fast_sync_enabled: false,
            audit_interval: 4,
            sampling_limit: 2,
            metrics_refresh_interval_secs: 1,
            metrics_round_trip_timeout_secs: 2,
            request_timeout_secs: 1,
            stale_after_secs: 0,
        }
    }

    /// Machine cycle timer.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    /// Roster refresh timer.
    pub fn metrics_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_refresh_interval_secs)
    }

    /// Per-peer metrics round-trip deadline.
    pub fn metrics_round_trip_timeout(&self) -> Duration {
        Duration::from_secs(self.metrics_round_trip_timeout_secs)
    }

    /// Per-request Node deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Age after which cached metrics no longer vote.
    pub fn stale_after(&self) -> Duration {
        if self.stale_after_secs == 0 {
            self.metrics_refresh_interval() * 3
        } else {
            Duration::from_secs(self.stale_after_secs)
        }
    }

    /// Reject values that would stall or spin the engine.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.fetch_batch_size == 0 {
            return Err(SyncError::Config("fetch_batch_size must be > 0".into()));
        }
        if self.audit_interval == 0 {
            return Err(SyncError::Config("audit_interval must be > 0".into()));
        }
        if self.cycle_interval_ms == 0 {
            return Err(SyncError::Config("cycle_interval_ms must be > 0".into()));
        }
        if self.metrics_refresh_interval_secs == 0 {
            return Err(SyncError::Config(
                "metrics_refresh_interval_secs must be > 0".into(),
            ));
        }
        if self.metrics_round_trip_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(SyncError::Config("timeouts must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.min_connected_peers, 3);
        assert_eq!(config.fork_protection, 100);
        assert_eq!(config.cycle_interval(), Duration::from_secs(1));
        assert_eq!(config.metrics_round_trip_timeout(), Duration::from_secs(30));
        assert!(config.fast_sync_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config() {
        let config = SyncConfig::for_testing();
        assert_eq!(config.min_connected_peers, 1);
        assert!(!config.fast_sync_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stale_after_defaults_to_three_refreshes() {
        let mut config = SyncConfig::default();
        assert_eq!(config.stale_after(), Duration::from_secs(30));

        config.stale_after_secs = 7;
        assert_eq!(config.stale_after(), Duration::from_secs(7));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = SyncConfig {
            fetch_batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_audit_interval() {
        let config = SyncConfig {
            audit_interval: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
