//! # dBFT-Chain Node
//!
//! Usage: `node-runtime [config.toml]`. The path may also come from
//! `DC_CONFIG`; `DC_*` variables then override single settings. Log
//! filtering follows `RUST_LOG` and defaults to `info`.

use anyhow::{Context, Result};
use node_runtime::{NodeConfig, NodeRuntime};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("DC_CONFIG").map(PathBuf::from))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let path = config_path();
    let config = NodeConfig::load(path.as_deref()).context("Failed to load configuration")?;

    let mut runtime = NodeRuntime::new(config).context("Failed to build node")?;
    runtime.start();

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        _ = runtime.stopped() => {}
    }

    runtime.shutdown().await;
    Ok(())
}
