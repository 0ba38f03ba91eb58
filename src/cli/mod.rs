// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Skyscan detection node CLI
#[derive(Parser, Debug)]
#[command(name = "skyscan-cli")]
#[command(version)]
#[command(about = "CLI tools for the Skyscan detection node", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one image through enhancement and detection
    Detect(commands::DetectArgs),

    /// Validate configuration and probe the enhancer
    CheckConfig(commands::CheckConfigArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Detect(args) => commands::detect(args).await,
        Commands::CheckConfig(args) => commands::check_config(args).await,
    }
}
