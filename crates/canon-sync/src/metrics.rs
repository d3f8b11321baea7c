//! # Sync Metrics
//!
//! Thin recorders over the `canon-telemetry` registry.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! canon-sync = { path = "...", features = ["metrics"] }
//! ```
//!
//! Without the feature every recorder is a no-op.

#[cfg(feature = "metrics")]
use canon_telemetry::metrics as registry;

use crate::domain::SyncState;

/// Record an election outcome (`elected`, `inconclusive`).
#[cfg(feature = "metrics")]
pub fn record_election(outcome: &str, draw: bool) {
    registry::ELECTIONS.with_label_values(&[outcome]).inc();
    if draw {
        registry::ELECTION_DRAWS.inc();
    }
}

/// Record entry into `state`.
#[cfg(feature = "metrics")]
pub fn record_transition(state: SyncState) {
    registry::MACHINE_STATE.set(state.code());
    registry::TRANSITIONS.with_label_values(&[state.as_str()]).inc();
}

/// Record a storage rollback of `depth` blocks.
#[cfg(feature = "metrics")]
pub fn record_rollback(depth: u64, fork: bool) {
    registry::ROLLBACK_DEPTH.observe(depth as f64);
    if fork {
        registry::FORKS_RESOLVED.inc();
    }
}

/// Record one block fetched and stored.
#[cfg(feature = "metrics")]
pub fn record_block_fetched() {
    registry::BLOCKS_FETCHED.inc();
}

/// Record a fast-sync audit mismatch.
#[cfg(feature = "metrics")]
pub fn record_audit_failure() {
    registry::AUDIT_FAILURES.inc();
}

/// Record the roster size.
#[cfg(feature = "metrics")]
pub fn record_roster_size(size: usize) {
    registry::ROSTER_SIZE.set(size as i64);
}

/// Record a metrics refresh outcome (`ok`, `failed`).
#[cfg(feature = "metrics")]
pub fn record_metric_refresh(outcome: &str) {
    registry::METRIC_REFRESHES.with_label_values(&[outcome]).inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_election(_outcome: &str, _draw: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_transition(_state: SyncState) {}

#[cfg(not(feature = "metrics"))]
pub fn record_rollback(_depth: u64, _fork: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_block_fetched() {}

#[cfg(not(feature = "metrics"))]
pub fn record_audit_failure() {}

#[cfg(not(feature = "metrics"))]
pub fn record_roster_size(_size: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn record_metric_refresh(_outcome: &str) {}
