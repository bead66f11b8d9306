use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rse", about = "Small-scale web crawler & keyword search engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the crawl workers
    Crawl {
        /// Override CRAWLING_WORKERS
        #[arg(short, long)]
        workers: Option<usize>,

        /// Override MAXIMUM_DEPTH (-1 = unbounded)
        #[arg(short, long, allow_hyphen_values = true)]
        depth: Option<i64>,
    },
    /// Serve the search API
    Serve {
        /// Override LISTEN_ADDRESS
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Run a query from the terminal
    Search {
        query: String,

        /// Max results to print
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show store and queue statistics
    Status,
}
