// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Args;
use std::path::{Path, PathBuf};

use crate::config::NodeConfig;
use crate::enhancement::RemoteEnhancerClient;
use crate::pipeline::Pipeline;

/// Arguments for detect command
#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Image to annotate
    #[arg(long)]
    pub input: PathBuf,

    /// Where to write the annotated JPEG
    #[arg(long)]
    pub output: PathBuf,

    /// Skip the enhancer even if one is configured
    #[arg(long)]
    pub no_enhance: bool,

    /// TOML config file (can also be set via SKYSCAN_CONFIG env var)
    #[arg(long, env = "SKYSCAN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Arguments for check-config command
#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// TOML config file (can also be set via SKYSCAN_CONFIG env var)
    #[arg(long, env = "SKYSCAN_CONFIG")]
    pub config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    dotenv::dotenv().ok();

    let mut config = match path {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Run the full pipeline once and write the JPEG
pub async fn detect(args: DetectArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.no_enhance {
        config.enhancer.endpoint = None;
    }

    let pipeline = Pipeline::from_config(&config)?;
    if !pipeline.detector().is_ready() {
        anyhow::bail!(
            "Detector {} is not available (model path {})",
            pipeline.detector().name(),
            config.detector.model_path.display()
        );
    }

    let upload = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    println!("🔍 Detecting objects in {}...", args.input.display());
    let output = pipeline.run(Bytes::from(upload)).await?;

    tokio::fs::write(&args.output, &output.jpeg)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "✅ {} detections on {} image ({})",
        output.detection_count(),
        output.origin,
        output.dimensions
    );
    for detection in &output.detections {
        println!(
            "   {:<20} {:.2}  centre ({:.1}, {:.1})  {:.1}x{:.1}  {:.1}°",
            detection.label,
            detection.confidence,
            detection.cx,
            detection.cy,
            detection.width,
            detection.height,
            detection.angle.to_degrees()
        );
    }
    println!("💾 Wrote {}", args.output.display());
    Ok(())
}

/// Print the effective configuration and probe its dependencies
pub async fn check_config(args: CheckConfigArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    println!("{}", config.to_toml_string()?);

    if config.detector.model_path.exists() {
        println!("✅ Detector weights found at {}", config.detector.model_path.display());
    } else {
        println!("⚠️  Detector weights missing at {}", config.detector.model_path.display());
    }

    match config.enhancer.endpoint.as_deref() {
        Some(endpoint) if config.enhancer.is_enabled() => {
            let client = RemoteEnhancerClient::new(
                endpoint,
                &config.enhancer.model,
                config.enhancer.transport_timeout(),
            )?;
            if client.health_check().await {
                println!("✅ Enhancer reachable at {}", client.endpoint());
            } else {
                println!(
                    "⚠️  Enhancer at {} is not healthy; uploads will be detected as-is",
                    client.endpoint()
                );
            }
        }
        _ => println!("ℹ️  No enhancer configured"),
    }

    Ok(())
}
