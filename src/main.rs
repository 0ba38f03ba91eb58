// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use skyscan_node::{api::start_server, config::NodeConfig, pipeline::Pipeline, version};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🚀 Starting Skyscan detection node...\n");
    println!("📦 BUILD VERSION: {}", version::VERSION);
    println!("📅 Build Date: {}", version::BUILD_DATE);
    println!();

    let config = NodeConfig::load().context("Invalid configuration")?;
    let addr = config.api.socket_addr()?;

    println!("🧠 Loading detector from {}...", config.detector.model_path.display());
    let pipeline = Pipeline::from_config(&config)?;

    if pipeline.detector().is_ready() {
        println!("✅ Detector {} ready", pipeline.detector().name());
    } else {
        warn!("Detector not loaded; uploads will be rejected with 503 until restart");
    }

    match config.enhancer.endpoint.as_deref() {
        Some(endpoint) if pipeline.enhancer().is_configured() => info!(
            "Enhancement via {} at {} (scale {}, timeout {}s)",
            pipeline.enhancer().name(),
            endpoint,
            config.enhancer.scale,
            config.enhancer.timeout_secs
        ),
        _ => info!("Enhancement disabled; uploads are detected as-is"),
    }

    println!("🌐 Listening on http://{}", addr);
    start_server(addr, pipeline).await?;

    println!("👋 Skyscan node stopped");
    Ok(())
}
