use anyhow::Result;

use rse_core::Config;
use rse_parser::TermFilter;
use rse_search::QueryEngine;
use rse_storage::Storage;

pub async fn run(config: Config, query: String, limit: usize) -> Result<()> {
    let storage = Storage::connect(&config.database_url, 5).await?;
    storage.run_migrations().await?;

    let engine = QueryEngine::new(storage.pool().clone(), TermFilter::from_config(&config));
    let hits = engine.search(&query).await?;

    println!("Found {} results:\n", hits.len());
    for hit in hits.into_iter().take(limit) {
        println!("  {:>10.3}  {}", hit.score, hit.url);
        if let Some(title) = hit.title {
            println!("              {title}");
        }
        println!();
    }
    Ok(())
}
