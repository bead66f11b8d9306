mod cli;
mod commands;
mod crawl;
mod seeds;

use anyhow::Result;
use clap::Parser;

// High worker counts mean many short-lived allocations; mimalloc releases
// memory back to the OS where glibc malloc tends not to.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use rse_core::Config;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Crawl { workers, depth } => crawl::run_crawl(config, workers, depth).await,
        Commands::Serve { listen } => commands::serve::run(config, listen).await,
        Commands::Search { query, limit } => commands::search::run(config, query, limit).await,
        Commands::Status => commands::status::run(config).await,
    }
}
