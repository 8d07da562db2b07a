//! CLI commands for jpx-scrape.
//!
//! Supports an interactive numbered menu and a flag-driven `scrape` command.

use std::fmt;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use inquire::{Confirm, CustomType, InquireError, Select};
use tracing::warn;

use crate::config::AppConfig;
use crate::scraper::{RunOutcome, Runner};
use crate::storage::save_reports;
use crate::types::Statistics;

/// Industries listed in the console summary
const TOP_INDUSTRIES: usize = 10;

#[derive(Parser)]
#[command(name = "jpx-scrape")]
#[command(version, about = "JPX listed company search scraper", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./jpx.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose the run mode from a menu (default)
    Interactive,

    /// Scrape without prompts
    Scrape(ScrapeArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScrapeArgs {
    /// Stop after this many pages
    #[arg(short, long)]
    pub max_pages: Option<u32>,

    /// Seconds between pages
    #[arg(short, long)]
    pub delay: Option<f64>,

    /// Rows per page (10, 50, 100 or 200)
    #[arg(short, long)]
    pub page_size: Option<u32>,

    /// Market segment code, repeatable (011 Prime, 012 Standard, 013 Growth)
    #[arg(short, long = "segment", value_name = "CODE")]
    pub segments: Vec<String>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Do not save raw HTML of each page
    #[arg(long)]
    pub no_snapshots: bool,
}

impl ScrapeArgs {
    /// Layer the flags over the loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(max_pages) = self.max_pages {
            config.scraper.max_pages = Some(max_pages);
        }
        if let Some(delay) = self.delay {
            config.scraper.delay_secs = delay;
        }
        if let Some(page_size) = self.page_size {
            config.filters.page_size = page_size;
        }
        if !self.segments.is_empty() {
            config.filters.segments = self.segments.clone();
        }
        if let Some(dir) = &self.output {
            config.output.dir = dir.clone();
        }
        if self.no_snapshots {
            config.output.snapshots = false;
        }
    }
}

/// Run modes offered by the interactive menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    SinglePage,
    AllPages,
    LimitedPages,
}

impl RunMode {
    const ALL: [RunMode; 3] = [RunMode::SinglePage, RunMode::AllPages, RunMode::LimitedPages];
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::SinglePage => write!(f, "1. Single page (fast)"),
            RunMode::AllPages => write!(f, "2. All pages"),
            RunMode::LimitedPages => write!(f, "3. Limited number of pages"),
        }
    }
}

/// Run the interactive menu, then scrape.
pub async fn run_interactive(mut config: AppConfig) -> anyhow::Result<()> {
    let Some(mode) = cancellable(Select::new("Select mode:", RunMode::ALL.to_vec()).prompt())? else {
        return Ok(());
    };

    match mode {
        RunMode::SinglePage => {
            config.scraper.max_pages = Some(1);
        }
        RunMode::AllPages => {
            config.scraper.max_pages = None;
            let Some(delay) = prompt_delay(config.scraper.delay_secs)? else {
                return Ok(());
            };
            config.scraper.delay_secs = delay;

            let confirmed = cancellable(
                Confirm::new("This may take a long time. Continue?")
                    .with_default(false)
                    .prompt(),
            )?;
            match confirmed {
                Some(true) => {}
                Some(false) => {
                    println!("Cancelled");
                    return Ok(());
                }
                None => return Ok(()),
            }
        }
        RunMode::LimitedPages => {
            let Some(pages) = cancellable(
                CustomType::<u32>::new("Number of pages:")
                    .with_default(5)
                    .with_error_message("Enter a whole number")
                    .prompt(),
            )?
            else {
                return Ok(());
            };
            config.scraper.max_pages = Some(pages.max(1));

            let Some(delay) = prompt_delay(config.scraper.delay_secs)? else {
                return Ok(());
            };
            config.scraper.delay_secs = delay;
        }
    }

    run_scrape(config).await
}

fn prompt_delay(default: f64) -> anyhow::Result<Option<f64>> {
    cancellable(
        CustomType::<f64>::new("Delay between requests in seconds:")
            .with_default(default)
            .with_error_message("Enter a number of seconds")
            .prompt(),
    )
}

/// Treat Esc and Ctrl-C at a prompt as a clean exit
fn cancellable<T>(answer: Result<T, InquireError>) -> anyhow::Result<Option<T>> {
    match answer {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
            println!("Cancelled");
            Ok(None)
        }
        Err(err) => Err(err).context("prompt failed"),
    }
}

/// Scrape with `config`, print the summary and write the artifacts.
pub async fn run_scrape(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    let runner = Runner::from_config(&config).context("failed to set up scraper")?;
    let outcome = runner
        .run()
        .await
        .context("could not establish a search session")?;

    print_summary(&outcome);

    let paths = save_reports(&outcome, &config.output).context("failed to write artifacts")?;
    println!("\nFull data: {}", paths.full.display());
    println!("Simplified data: {}", paths.simple.display());
    if let Some(csv) = &paths.csv {
        println!("Table: {}", csv.display());
    }

    if let Some(err) = outcome.error() {
        warn!(error = %err, companies = outcome.accumulator.len(), "run ended early, partial result saved");
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    match outcome.stop_reason() {
        Some(reason) => println!("\nCompleted: {reason}"),
        None => println!("\nPartial result"),
    }
    println!("Pages processed: {}", outcome.pages_processed);
    match outcome.expected_total {
        Some(total) => println!("Companies: {} of {}", outcome.accumulator.len(), total),
        None => println!("Companies: {}", outcome.accumulator.len()),
    }
    if outcome.flushes > 0 {
        println!("Intermediate flushes: {}", outcome.flushes);
    }

    print_statistics(outcome.accumulator.statistics());
}

/// Segments by name, then the most common industries
pub fn print_statistics(statistics: &Statistics) {
    if !statistics.segments.is_empty() {
        println!("\nBy market segment:");
        for (segment, count) in &statistics.segments {
            println!("  {:<30} {:>6}", segment, count);
        }
    }

    let top = statistics.top_industries(TOP_INDUSTRIES);
    if !top.is_empty() {
        println!("\nTop {} industries:", TOP_INDUSTRIES);
        for (industry, count) in top {
            println!("  {:<30} {:>6}", industry, count);
        }
    }
}
