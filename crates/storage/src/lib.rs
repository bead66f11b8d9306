use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use rse_core::ExtractedPage;

#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
}

impl Storage {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    /// Persist one crawled page in a single transaction: upsert the page
    /// row by URL, then replace its keyword and forward-link rows
    /// wholesale. A re-crawl therefore ends up with exactly the rows
    /// derived from the latest body.
    pub async fn store_page(&self, url: &str, page: &ExtractedPage) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let row: (i64,) = sqlx::query_as(
            r#"INSERT INTO pages (url, title, description, last_crawled_at)
               VALUES ($1, $2, $3, NOW())
               ON CONFLICT (url) DO UPDATE SET
                   title = EXCLUDED.title,
                   description = EXCLUDED.description,
                   last_crawled_at = NOW()
               RETURNING id"#,
        )
        .bind(url)
        .bind(&page.title)
        .bind(&page.description)
        .fetch_one(&mut *tx)
        .await?;
        let page_id = row.0;

        sqlx::query("DELETE FROM keywords WHERE page_id = $1")
            .bind(page_id)
            .execute(&mut *tx)
            .await?;
        if !page.keywords.is_empty() {
            let mut words: Vec<String> = Vec::with_capacity(page.keywords.len());
            let mut frequencies: Vec<i32> = Vec::with_capacity(page.keywords.len());
            for (word, frequency) in &page.keywords {
                words.push(word.clone());
                frequencies.push(*frequency as i32);
            }
            sqlx::query(
                "INSERT INTO keywords (page_id, word, frequency)
                 SELECT $1, * FROM UNNEST($2::text[], $3::int[])",
            )
            .bind(page_id)
            .bind(&words)
            .bind(&frequencies)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM forward_links WHERE from_page_id = $1")
            .bind(page_id)
            .execute(&mut *tx)
            .await?;
        if !page.links.is_empty() {
            let mut targets: Vec<String> = Vec::with_capacity(page.links.len());
            let mut frequencies: Vec<i32> = Vec::with_capacity(page.links.len());
            for link in &page.links {
                targets.push(link.url.clone());
                frequencies.push(link.frequency as i32);
            }
            sqlx::query(
                "INSERT INTO forward_links (from_page_id, to_url, frequency)
                 SELECT $1, * FROM UNNEST($2::text[], $3::int[])",
            )
            .bind(page_id)
            .bind(&targets)
            .bind(&frequencies)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(page_id)
    }

    /// When this URL was last successfully crawled, if ever.
    pub async fn last_crawled_at(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT last_crawled_at FROM pages WHERE url = $1")
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(ts,)| ts))
    }

    pub async fn page_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn keyword_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM keywords")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn link_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM forward_links")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn check_connectivity(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
