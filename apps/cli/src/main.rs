//! JobCompass CLI: job-posting ingestion for the Canadian tech market.
//!
//! Collects postings from public sources, filters and deduplicates them,
//! derives structured features, and stores everything in a local database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
