//! # Canon Telemetry
//!
//! Logging and metrics for the Canon node.
//!
//! ## Components
//!
//! - Structured logs through `tracing-subscriber` (plain or JSON)
//! - Prometheus metrics in a crate-owned registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use canon_telemetry::{TelemetryConfig, init_telemetry};
//!
//! let config = TelemetryConfig::from_env();
//! let _guard = init_telemetry(config).expect("Failed to init telemetry");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CANON_SERVICE_NAME` | `canon-node` | Service name in logs |
//! | `CANON_LOG_LEVEL` | `info` | Log level filter |
//! | `CANON_JSON_LOGS` | `false` | JSON log lines |
//! | `CANON_METRICS_PORT` | `9100` | Prometheus port |
//! | `CANON_NETWORK` | `testnet` | Network name |

#![warn(missing_docs)]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};
pub use metrics::{encode_metrics, register_metrics, MetricsHandle};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The global subscriber could not be installed.
    #[error("Failed to initialize logger: {0}")]
    LoggerInit(String),

    /// Metric registration or encoding failed.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so early log lines can already be counted against them
    let metrics = register_metrics()?;
    init_logging(&config)?;

    tracing::info!(
        service = %config.full_service_name(),
        metrics_port = config.metrics_port,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { config, metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    config: TelemetryConfig,
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    /// Configuration the guard was built from.
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Current metrics in Prometheus text format.
    pub fn render_metrics(&self) -> Result<String, TelemetryError> {
        self.metrics.render()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Config("bad level".to_string());
        assert!(err.to_string().contains("bad level"));
    }
}
