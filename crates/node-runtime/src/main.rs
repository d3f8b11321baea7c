//! # Canon Node Runtime
//!
//! Entry point for the Canon node.
//!
//! ## Startup Sequence
//!
//! 1. Install telemetry (`CANON_LOG_LEVEL`, `CANON_JSON_LOGS`, ...)
//! 2. Load configuration (`CANON_CONFIG`, then environment overrides)
//! 3. Build the container and start the sync engine
//! 4. Run until Ctrl-C, then shut down gracefully

use anyhow::{Context, Result};
use canon_telemetry::{init_telemetry, TelemetryConfig};
use node_runtime::{load_config, NodeRuntime};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("failed to initialize telemetry")?;

    let config = load_config().context("failed to load configuration")?;
    let runtime = NodeRuntime::new(config)?;
    runtime.start()?;

    info!("[runtime] Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
