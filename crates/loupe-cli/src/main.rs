//! Loupe CLI - Headless playback controller toolkit
//!
//! Features:
//! - Manifest analysis (rendition ladder, network class, initial pick)
//! - Event-trace replay through a playback session

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Loupe CLI - Adaptive playback controller toolkit
#[derive(Parser)]
#[command(name = "loupe-cli")]
#[command(version)]
#[command(about = "Inspect manifests and replay playback traces", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an HLS manifest
    Analyze {
        /// URL or path to manifest
        manifest: String,

        /// Environment network hint (slow-2g, 2g, 3g, 4g)
        #[arg(short, long)]
        effective_type: Option<String>,

        /// Viewport width in CSS pixels
        #[arg(long, default_value = "1280")]
        viewport_width: u32,

        /// Viewport height in CSS pixels
        #[arg(long, default_value = "720")]
        viewport_height: u32,

        /// Assume a low-power mobile engine
        #[arg(long)]
        low_power: bool,
    },

    /// Replay a recorded event trace through a session
    Simulate {
        /// Trace file (JSON)
        trace: PathBuf,

        /// Controller config overrides (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over the verbosity flag
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
    loupe_core::init();

    match cli.command {
        Commands::Analyze {
            manifest,
            effective_type,
            viewport_width,
            viewport_height,
            low_power,
        } => {
            let host = loupe_core::HostEnvironment {
                viewport_width,
                viewport_height,
                low_power_engine: low_power,
                native_playback: false,
            };
            commands::analyze(&manifest, effective_type.as_deref(), host, &cli.format).await?;
        }
        Commands::Simulate { trace, config } => {
            commands::simulate(&trace, config.as_deref(), &cli.format)?;
        }
    }

    Ok(())
}
