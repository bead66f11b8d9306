use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

use rse_core::{normalize_url, Config, CrawlError, CrawlJob, FetchResponse};
use rse_fetcher::Fetcher;
use rse_frontier::{Frontier, HostPoliteness};
use rse_parser::KeywordExtractor;
use rse_storage::Storage;

use crate::seeds::{parse_seeds, pick_seed};

/// Back-off when the queue service is unreachable.
const QUEUE_RETRY_DELAY: Duration = Duration::from_secs(5);
/// How long the queue must sit empty before the supervisor considers seeding.
const SEED_GRACE: Duration = Duration::from_secs(3);
/// Sleep between polls of an empty queue.
const IDLE_POLL: Duration = Duration::from_secs(2);
/// Warn when nothing has been stored for this long.
const STALL_THRESHOLD: Duration = Duration::from_secs(300);
/// How long in-flight pages get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// A fetched page travelling from a crawl worker to a processing worker.
struct Fetched {
    job: CrawlJob,
    /// Normalized form of the popped URL; the `pages.url` key.
    url: Url,
    /// Last redirect hop, used as the base for link resolution.
    final_url: Url,
    body: Vec<u8>,
}

pub async fn run_crawl(
    mut config: Config,
    workers: Option<usize>,
    depth: Option<i64>,
) -> Result<()> {
    if let Some(n) = workers {
        config.crawling_workers = n;
    }
    if let Some(d) = depth {
        config.maximum_depth = d;
    }
    let crawling_workers = config.crawling_workers.max(1);
    let processing_workers = config.processing_workers.max(1);

    // Pool scaled to worker count plus headroom for the supervisor tasks.
    let pool_size = ((crawling_workers + processing_workers) as u32 + 5).max(10);
    let storage = Storage::connect(&config.database_url, pool_size).await?;
    storage.run_migrations().await?;

    let frontier = Frontier::connect(&config.queue_url).await?;
    let fetcher = Arc::new(Fetcher::new(&config)?);
    let politeness = Arc::new(HostPoliteness::new());
    let extractor = Arc::new(KeywordExtractor::from_config(&config));
    let storage = Arc::new(storage);
    let config = Arc::new(config);
    let seeds = parse_seeds(&config.seed_urls);

    let (fetched_tx, fetched_rx) = mpsc::channel::<Fetched>(crawling_workers * 4);
    let fetched_rx = Arc::new(Mutex::new(fetched_rx));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let pages_stored = Arc::new(AtomicU64::new(0));

    info!(crawling_workers, processing_workers, "spawning crawl workers");
    let mut handles = Vec::new();

    for worker_id in 0..crawling_workers {
        let frontier = frontier.clone();
        let fetcher = Arc::clone(&fetcher);
        let politeness = Arc::clone(&politeness);
        let storage = Arc::clone(&storage);
        let config = Arc::clone(&config);
        let fetched_tx = fetched_tx.clone();
        let mut shutdown = shutdown_tx.subscribe();

        handles.push(tokio::spawn(async move {
            info!(worker_id, "crawl worker started");
            let mut idle_count = 0u32;
            // The shutdown check sits between rounds so a signal never
            // abandons a page that was already popped.
            while matches!(
                shutdown.try_recv(),
                Err(broadcast::error::TryRecvError::Empty)
            ) {
                crawl_round(
                    worker_id,
                    &frontier,
                    &fetcher,
                    &politeness,
                    &storage,
                    &config,
                    &fetched_tx,
                    &mut idle_count,
                )
                .await;
            }
            info!(worker_id, "crawl worker shutting down");
        }));
    }
    // Only the workers hold senders from here on, so the channel closes
    // once they all exit and the processing stage drains what is left.
    drop(fetched_tx);

    for worker_id in 0..processing_workers {
        let fetched_rx = Arc::clone(&fetched_rx);
        let frontier = frontier.clone();
        let storage = Arc::clone(&storage);
        let extractor = Arc::clone(&extractor);
        let config = Arc::clone(&config);
        let pages_stored = Arc::clone(&pages_stored);

        handles.push(tokio::spawn(async move {
            loop {
                let fetched = { fetched_rx.lock().await.recv().await };
                let Some(fetched) = fetched else {
                    break;
                };
                match process_page(&fetched, &storage, &frontier, &extractor, &config).await {
                    Ok(page_id) => {
                        let total = pages_stored.fetch_add(1, Ordering::Relaxed) + 1;
                        info!(worker_id, page_id, url = %fetched.url, total, "stored page");
                    }
                    Err(e) => {
                        error!(worker_id, url = %fetched.url, error = %e, "failed to persist page");
                    }
                }
            }
            info!(worker_id, "processing worker stopped");
        }));
    }

    // Supervisor: seed the queue when it runs dry and the store is empty.
    let seeder = {
        let frontier = frontier.clone();
        let storage = Arc::clone(&storage);
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(SEED_GRACE) => {
                        if let Err(e) = seed_if_idle(&frontier, &storage, &seeds).await {
                            warn!(error = %e, "seed check failed, backing off");
                            tokio::time::sleep(QUEUE_RETRY_DELAY).await;
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    };

    // Stall watchdog.
    let watchdog = {
        let pages_stored = Arc::clone(&pages_stored);
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut last_seen = 0u64;
            let mut stalled_for = Duration::ZERO;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {
                        let stored = pages_stored.load(Ordering::Relaxed);
                        if stored == last_seen {
                            stalled_for += Duration::from_secs(60);
                            if stalled_for >= STALL_THRESHOLD {
                                warn!(
                                    pages_stored = stored,
                                    idle_secs = stalled_for.as_secs(),
                                    "no pages stored recently, crawl may be stalled"
                                );
                            }
                        } else {
                            last_seen = stored;
                            stalled_for = Duration::ZERO;
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    };

    info!(workers = crawling_workers, "crawler running, press Ctrl+C to stop");
    shutdown_signal().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());

    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("shutdown grace period expired, abandoning in-flight work");
    }
    let _ = seeder.await;
    let _ = watchdog.await;

    info!(
        pages_stored = pages_stored.load(Ordering::Relaxed),
        "shutdown complete"
    );
    Ok(())
}

/// One pop-decide-fetch round of a crawl worker. Every failure mode is
/// handled here; the worker loop never crashes.
#[allow(clippy::too_many_arguments)]
async fn crawl_round(
    worker_id: usize,
    frontier: &Frontier,
    fetcher: &Fetcher,
    politeness: &HostPoliteness,
    storage: &Storage,
    config: &Config,
    fetched_tx: &mpsc::Sender<Fetched>,
    idle_count: &mut u32,
) {
    let job = match frontier.pop().await {
        Ok(Some(job)) => job,
        Ok(None) => {
            *idle_count += 1;
            if *idle_count % 30 == 1 {
                debug!(worker_id, idle_count = *idle_count, "queue empty, waiting for URLs");
            }
            tokio::time::sleep(IDLE_POLL).await;
            return;
        }
        Err(e) => {
            warn!(worker_id, error = %e, "queue unavailable, backing off");
            tokio::time::sleep(QUEUE_RETRY_DELAY).await;
            return;
        }
    };
    *idle_count = 0;

    let Ok(parsed) = Url::parse(&job.url) else {
        debug!(worker_id, url = %job.url, "dropping unparseable URL");
        return;
    };
    let url = normalize_url(&parsed);
    if url.scheme() != "http" && url.scheme() != "https" {
        return;
    }
    let Some(host) = url.host_str().map(str::to_string) else {
        return;
    };

    match skip_as_visited(frontier, storage, url.as_str(), config).await {
        Ok(true) => return,
        Ok(false) => {}
        Err(e) => {
            warn!(worker_id, url = %url, error = %e, "visited check failed, backing off");
            let _ = frontier.push(&job).await;
            tokio::time::sleep(QUEUE_RETRY_DELAY).await;
            return;
        }
    }

    // Politeness: admission or back to the tail, then on to another URL.
    if !politeness.try_admit(&host, config.crawl_delay) {
        if let Err(e) = frontier.push(&job).await {
            warn!(worker_id, url = %url, error = %e, "failed to re-queue for politeness");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        return;
    }

    let response = match fetch_with_retries(fetcher, &url, config, worker_id).await {
        FetchOutcome::Fetched(response) => response,
        FetchOutcome::NegativeCache => {
            if let Err(e) = frontier.mark_visited(url.as_str()).await {
                warn!(worker_id, url = %url, error = %e, "failed to mark visited");
            }
            return;
        }
        FetchOutcome::Drop => return,
    };

    let fetched = Fetched {
        job,
        url,
        final_url: response.final_url,
        body: response.body,
    };
    if fetched_tx.send(fetched).await.is_err() {
        error!(worker_id, "processing channel closed");
    }
}

enum FetchOutcome {
    Fetched(FetchResponse),
    /// Permanent failure; remember the URL so it is not retried this window.
    NegativeCache,
    /// Structural failure or robots denial; forget the URL without marking it.
    Drop,
}

/// Fetch with a bounded in-worker retry loop: timeouts, refused
/// connections, and 5xx retry up to `max_retries` with a fixed delay; 4xx
/// and exhausted retries negative-cache the URL; DNS failures and robots
/// denials drop it outright.
async fn fetch_with_retries(
    fetcher: &Fetcher,
    url: &Url,
    config: &Config,
    worker_id: usize,
) -> FetchOutcome {
    let mut attempt = 0u32;
    loop {
        match fetcher.fetch(url).await {
            Ok(response) => return FetchOutcome::Fetched(response),
            Err(CrawlError::Disallowed) => {
                debug!(worker_id, url = %url, "disallowed by robots.txt");
                return FetchOutcome::Drop;
            }
            Err(CrawlError::Dns(e)) => {
                debug!(worker_id, url = %url, retry = attempt, error = %e, "dns failure");
                return FetchOutcome::Drop;
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                warn!(worker_id, url = %url, retry = attempt, error = %e, "fetch failed, retrying");
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(e) => {
                warn!(worker_id, url = %url, retry = attempt, error = %e, "fetch failed permanently");
                return FetchOutcome::NegativeCache;
            }
        }
    }
}

/// A visited URL is skipped unless its page row is old enough to re-fetch.
/// Visited entries without a page row are negative-cache entries and stay
/// skipped; losing the set entirely only means URLs get re-admitted.
async fn skip_as_visited(
    frontier: &Frontier,
    storage: &Storage,
    url: &str,
    config: &Config,
) -> Result<bool> {
    if !frontier.is_visited(url).await? {
        return Ok(false);
    }
    match storage.last_crawled_at(url).await? {
        Some(last_crawled_at) => {
            let age = Utc::now().signed_duration_since(last_crawled_at);
            Ok(age < chrono::Duration::seconds(config.revisit_delay.as_secs() as i64))
        }
        None => Ok(true),
    }
}

/// Extract, persist, and fan out one fetched page.
async fn process_page(
    fetched: &Fetched,
    storage: &Storage,
    frontier: &Frontier,
    extractor: &KeywordExtractor,
    config: &Config,
) -> Result<i64> {
    let mut page = rse_parser::extract(&fetched.final_url, &fetched.body, extractor);
    // Links are resolved against the final redirect hop, so a page may
    // still point at the URL it was requested under; never persist that.
    page.links.retain(|link| link.url != fetched.url.as_str());

    let page_id = storage.store_page(fetched.url.as_str(), &page).await?;
    frontier.mark_visited(fetched.url.as_str()).await?;

    let next_depth = fetched.job.depth + 1;
    if config.depth_allowed(next_depth) && !page.links.is_empty() {
        let jobs: Vec<CrawlJob> = page
            .links
            .iter()
            .map(|link| CrawlJob {
                url: link.url.clone(),
                depth: next_depth,
            })
            .collect();
        let enqueued = frontier.push_batch(&jobs).await?;
        debug!(page_id, url = %fetched.url, enqueued, "outlinks enqueued");
    }
    Ok(page_id)
}

async fn seed_if_idle(frontier: &Frontier, storage: &Storage, seeds: &[Url]) -> Result<()> {
    if frontier.len().await? > 0 {
        return Ok(());
    }
    if storage.page_count().await? > 0 {
        return Ok(());
    }
    let Some(seed) = pick_seed(seeds) else {
        debug!("queue and store are empty but no seeds are configured");
        return Ok(());
    };
    info!(seed = %seed, "queue empty, seeding");
    frontier.push(&CrawlJob::seed(seed)).await?;
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    signal::ctrl_c().await?;
    Ok(())
}
