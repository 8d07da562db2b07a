//! jpx-scrape
//!
//! Command-line entry point for the JPX listed company scraper.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jpx_scrape::cli::{self, Cli, Commands};
use jpx_scrape::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load_from(cli.config.as_deref())?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!(?config, "configuration loaded");

    match cli.command.unwrap_or(Commands::Interactive) {
        Commands::Interactive => cli::run_interactive(config).await,
        Commands::Scrape(args) => {
            let mut config = config;
            args.apply(&mut config);
            cli::run_scrape(config).await
        }
    }
}
