// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vioscan::Config;

mod cli;

#[derive(Parser)]
#[command(name = "vioscan")]
#[command(about = "Scan QR codes with a camera or from image files")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan with the camera (default)
    Scan {
        /// Camera device to use for both facings, e.g. /dev/video2
        #[arg(short, long)]
        device: Option<PathBuf>,

        /// Keep scanning after each result
        #[arg(short, long)]
        batch: bool,
    },

    /// Decode a code from an image file
    Image {
        /// Image file (PNG, JPEG, ...)
        path: PathBuf,
    },

    /// List available cameras
    List,

    /// Show scan history
    History {
        /// Delete all history entries
        #[arg(long)]
        clear: bool,
    },

    /// Show the configuration
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=vioscan=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.or_else(Config::default_path);
    let config = match &config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::default(),
    };

    match cli.command {
        Some(Commands::Scan { device, batch }) => cli::scan(config, device, batch),
        Some(Commands::Image { path }) => cli::scan_image(config, &path),
        Some(Commands::List) => cli::list_cameras(&config),
        Some(Commands::History { clear }) => cli::show_history(clear),
        Some(Commands::Config) => cli::show_config(&config, config_path.as_deref()),
        None => cli::scan(config, None, false),
    }
}
