//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod scrape;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use unipass_scraper::config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "unipass")]
#[command(about = "UNIPASS HS classification case scraper")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape all classification cases from the start date onward
    Scrape {
        /// Start year of the date filter
        #[arg(long)]
        start_year: Option<i32>,
        /// Start month of the date filter (1-12)
        #[arg(long)]
        start_month: Option<u32>,
        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<u32>,
        /// Output directory (default: scraped_data)
        #[arg(short, long, env = "UNIPASS_OUTPUT_DIR")]
        output: Option<PathBuf>,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
        /// Connect to a running Chrome DevTools endpoint instead of launching one
        #[arg(long, env = "BROWSER_URL")]
        remote_url: Option<String>,
        /// Do not download case images
        #[arg(long)]
        no_images: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .await
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?,
        None => Config::load().await,
    };
    if let Some(path) = &config.source_path {
        tracing::debug!("Loaded config from {}", path.display());
    }

    match cli.command {
        Commands::Scrape {
            start_year,
            start_month,
            max_pages,
            output,
            headed,
            remote_url,
            no_images,
        } => {
            let overrides = Overrides {
                output_dir: output,
                start_year,
                start_month,
                max_pages,
                headed,
                remote_url,
                skip_images: no_images,
            };
            let cwd = std::env::current_dir()?;
            let settings = config.resolve(&overrides, &cwd)?;
            scrape::cmd_scrape(&settings).await
        }
    }
}
