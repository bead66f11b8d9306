use anyhow::Result;

use rse_core::Config;
use rse_frontier::Frontier;
use rse_storage::Storage;

pub async fn run(config: Config) -> Result<()> {
    let storage = Storage::connect(&config.database_url, 5).await?;

    match storage.check_connectivity().await {
        Ok(()) => println!("Database: connected"),
        Err(e) => {
            println!("Database: ERROR - {}", e);
            return Ok(());
        }
    }

    storage.run_migrations().await?;

    let queued = match Frontier::connect(&config.queue_url).await {
        Ok(frontier) => match frontier.len().await {
            Ok(n) => n.to_string(),
            Err(e) => format!("ERROR - {}", e),
        },
        Err(e) => format!("ERROR - {}", e),
    };

    let pages = storage.page_count().await?;
    let keywords = storage.keyword_count().await?;
    let links = storage.link_count().await?;

    println!("\n╔══════════════════════════════════════════════╗");
    println!("║                RSE Status                    ║");
    println!("╠══════════════════════════════════════════════╣");
    println!("║ Pages crawled:      {:>20}    ║", pages);
    println!("║ Keywords indexed:   {:>20}    ║", keywords);
    println!("║ Forward links:      {:>20}    ║", links);
    println!("║ URLs queued:        {:>20}    ║", queued);
    println!("╚══════════════════════════════════════════════╝\n");

    Ok(())
}
