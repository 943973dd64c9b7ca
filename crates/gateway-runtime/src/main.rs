//! # Twin-Connect
//!
//! Connectivity gateway between external transports, the internal signal
//! router and WebSocket streaming clients.
//!
//! ## Usage
//!
//! ```bash
//! TC_CONFIG=gateway.toml twin-connect
//! ```
//!
//! See [`gateway_runtime::config`] for the file format and environment
//! overrides. Logging is controlled by `RUST_LOG` / `TC_LOG_LEVEL` and
//! `TC_JSON_LOGS`.

use anyhow::{Context, Result};
use gateway_runtime::{GatewayConfig, GatewayRuntime};
use gateway_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(&TelemetryConfig::from_env()).context("failed to initialise telemetry")?;

    let config = GatewayConfig::load().context("failed to load gateway configuration")?;

    let mut runtime = GatewayRuntime::new(config);
    runtime.start().await?;

    info!("Gateway is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
