//! Prometheus metrics for the Canon node.
//!
//! All metrics follow the naming convention: `canon_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., elections_total)
//! - **Gauge**: Value that can go up or down (e.g., roster_size)
//! - **Histogram**: Distribution of values (e.g., rollback_depth_blocks)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // ELECTION METRICS
    // =========================================================================

    /// Elections by outcome (elected, insufficient, empty)
    pub static ref ELECTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("canon_sync_elections_total", "Chain elections by outcome"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Elections decided by the digest tie-break
    pub static ref ELECTION_DRAWS: IntCounter = IntCounter::new(
        "canon_sync_election_draws_total",
        "Elections whose top buckets drew on vote count"
    ).expect("metric creation failed");

    // =========================================================================
    // MACHINE METRICS
    // =========================================================================

    /// Current state of the sync machine (ordinal)
    pub static ref MACHINE_STATE: IntGauge = IntGauge::new(
        "canon_sync_machine_state",
        "Current sync machine state (0=connecting .. 5=sampling)"
    ).expect("metric creation failed");

    /// Transitions by target state
    pub static ref TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("canon_sync_transitions_total", "Sync machine transitions"),
        &["to"]
    ).expect("metric creation failed");

    /// Forks resolved by rolling back to a common ancestor
    pub static ref FORKS_RESOLVED: IntCounter = IntCounter::new(
        "canon_sync_forks_resolved_total",
        "Forks resolved by truncating local storage"
    ).expect("metric creation failed");

    /// Depth of each storage rollback
    pub static ref ROLLBACK_DEPTH: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "canon_sync_rollback_depth_blocks",
            "Blocks removed per rollback"
        ).buckets(exponential_buckets(1.0, 2.0, 12).expect("valid buckets"))
    ).expect("metric creation failed");

    /// Blocks fetched and stored during sync
    pub static ref BLOCKS_FETCHED: IntCounter = IntCounter::new(
        "canon_sync_blocks_fetched_total",
        "Blocks fetched from peers and stored"
    ).expect("metric creation failed");

    /// Fast-sync audits that found a forged block
    pub static ref AUDIT_FAILURES: IntCounter = IntCounter::new(
        "canon_sync_audit_failures_total",
        "Fast-sync digest audits that did not match the peer"
    ).expect("metric creation failed");

    // =========================================================================
    // PEER METRICS
    // =========================================================================

    /// Candidates currently on the roster
    pub static ref ROSTER_SIZE: IntGauge = IntGauge::new(
        "canon_peers_roster_size",
        "Peers currently on the voting roster"
    ).expect("metric creation failed");

    /// Metric refresh round trips by outcome
    pub static ref METRIC_REFRESHES: IntCounterVec = IntCounterVec::new(
        Opts::new("canon_peers_metric_refreshes_total", "Peer metric refreshes"),
        &["outcome"]
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Render the registry in Prometheus text format.
    pub fn render(&self) -> Result<String, TelemetryError> {
        encode_registry(&self.registry)
    }
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Elections
        Box::new(ELECTIONS.clone()),
        Box::new(ELECTION_DRAWS.clone()),
        // Machine
        Box::new(MACHINE_STATE.clone()),
        Box::new(TRANSITIONS.clone()),
        Box::new(FORKS_RESOLVED.clone()),
        Box::new(ROLLBACK_DEPTH.clone()),
        Box::new(BLOCKS_FETCHED.clone()),
        Box::new(AUDIT_FAILURES.clone()),
        // Peers
        Box::new(ROSTER_SIZE.clone()),
        Box::new(METRIC_REFRESHES.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode_registry(&REGISTRY)
}

fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // May fail if another test registered first, which is fine
        let _ = register_metrics();
    }

    #[test]
    fn test_counter_increment() {
        ELECTIONS.with_label_values(&["elected"]).inc();
        assert!(ELECTIONS.with_label_values(&["elected"]).get() >= 1);
    }

    #[test]
    fn test_gauge_set() {
        ROSTER_SIZE.set(7);
        assert_eq!(ROSTER_SIZE.get(), 7);
    }

    #[test]
    fn test_encode_contains_registered_metric() {
        let _ = register_metrics();
        FORKS_RESOLVED.inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("canon_sync_forks_resolved_total"));
    }
}
