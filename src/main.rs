//! unipass - UNIPASS HS classification case scraper.
//!
//! Walks the customs service's domestic classification case listing in a
//! browser and saves every case as JSON, CSV and a printed PDF.

mod cli;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() {
        "unipass_scraper=debug,unipass=debug"
    } else {
        "unipass_scraper=info,unipass=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
