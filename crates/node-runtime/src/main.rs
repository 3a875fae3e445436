//! # Peer Node
//!
//! Starts a peer: the root group with the reference services, running until
//! Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging and metrics)
//! 2. Load configuration (file named by `PG_CONFIG`, then `PG_*` overrides)
//! 3. Boot the root group
//! 4. Wait for Ctrl+C, then stop every group

use anyhow::{Context, Result};
use group_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

use node_runtime::{PeerNode, PlatformConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(&TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = PlatformConfig::from_env().context("Failed to load configuration")?;

    // Group construction blocks while modules load and start.
    let node = tokio::task::spawn_blocking(move || PeerNode::boot(&config))
        .await
        .context("Boot task panicked")??;

    info!("Peer is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    tokio::task::spawn_blocking(move || node.shutdown())
        .await
        .context("Shutdown task panicked")?;

    if let Ok(metrics) = group_telemetry::encode_metrics() {
        info!("Final metrics:\n{}", metrics);
    }
    Ok(())
}
