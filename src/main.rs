use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod announcer;
mod audio;
mod camera;
mod config;
mod feedback;
mod geometry;
mod pipeline;
mod recorder;
mod vision;

use crate::config::PathsenseConfig;
use crate::pipeline::GuidancePipeline;

#[derive(Parser)]
#[command(name = "pathsense")]
#[command(about = "Camera-based walking aid with spoken hazard guidance")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Camera device index (overrides the config file)
    #[arg(short = 'd', long)]
    camera_device: Option<u32>,

    /// Record annotated frames to disk
    #[arg(short, long)]
    record: bool,

    /// Announcement cooldown in seconds (overrides the config file)
    #[arg(long)]
    cooldown: Option<f64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(format!("pathsense={}", log_level))
        .try_init();

    info!("Starting pathsense - camera-based walking aid");

    // Load configuration, then apply command-line overrides
    let mut config = PathsenseConfig::load(&args.config).await?;
    if let Some(device) = args.camera_device {
        config.camera.device_index = device;
    }
    if args.record {
        config.output.record = true;
    }
    if let Some(cooldown) = args.cooldown {
        config.feedback.cooldown_seconds = cooldown;
    }
    config.validate()?;
    info!("Configuration loaded successfully");

    let mut pipeline = GuidancePipeline::new(config).await?;
    info!("Pipeline initialized, starting guidance loop");

    match pipeline.run().await {
        Ok(_) => info!("Guidance loop completed successfully"),
        Err(e) => {
            error!("Guidance loop error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
