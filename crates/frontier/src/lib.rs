use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use rse_core::CrawlJob;

/// Queue of pending URLs, oldest first.
const QUEUE_KEY: &str = "rse:url_queue";
/// URLs fetched (or negative-cached) within the current revisit window.
const VISITED_KEY: &str = "rse:visited_urls";

/// Client for the shared queue service. The queue and the visited set are
/// durable in Redis, so crawls resume across restarts and multiple crawler
/// processes coordinate through the same keys.
///
/// The visited set is an optimization, not a source of truth: flushing it
/// only causes URLs to be re-admitted, and the per-page transaction in the
/// store keeps the final state consistent.
#[derive(Clone)]
pub struct Frontier {
    conn: ConnectionManager,
}

impl Frontier {
    pub async fn connect(queue_url: &str) -> Result<Self> {
        let client = redis::Client::open(queue_url).context("invalid QUEUE_URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("queue service unreachable")?;
        Ok(Self { conn })
    }

    /// Push one job onto the queue tail.
    pub async fn push(&self, job: &CrawlJob) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(QUEUE_KEY, payload).await?;
        Ok(())
    }

    /// Push a batch of jobs in one round-trip. Returns how many were sent.
    pub async fn push_batch(&self, jobs: &[CrawlJob]) -> Result<usize> {
        if jobs.is_empty() {
            return Ok(0);
        }
        let payloads: Vec<String> = jobs
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<_, _>>()?;
        let count = payloads.len();
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(QUEUE_KEY, payloads).await?;
        Ok(count)
    }

    /// Pop the next job from the queue head. Entries that fail to decode
    /// (e.g. left behind by an older build) are discarded.
    pub async fn pop(&self) -> Result<Option<CrawlJob>> {
        let mut conn = self.conn.clone();
        loop {
            let payload: Option<String> = conn.lpop(QUEUE_KEY, None).await?;
            let Some(raw) = payload else {
                return Ok(None);
            };
            match serde_json::from_str(&raw) {
                Ok(job) => return Ok(Some(job)),
                Err(e) => debug!(error = %e, "discarding undecodable queue entry"),
            }
        }
    }

    pub async fn len(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let n: usize = conn.llen(QUEUE_KEY).await?;
        Ok(n)
    }

    pub async fn mark_visited(&self, url: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(VISITED_KEY, url).await?;
        Ok(())
    }

    pub async fn is_visited(&self, url: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let member: bool = conn.sismember(VISITED_KEY, url).await?;
        Ok(member)
    }
}

/// Per-host admission for politeness, shared by all workers in a process.
///
/// Admission checks the last fetch timestamp and stamps the new one in a
/// single critical section, so two workers can never be admitted to the
/// same host inside one delay window.
#[derive(Default)]
pub struct HostPoliteness {
    last_fetch: DashMap<String, Instant>,
}

impl HostPoliteness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and records the visit if at least `min_delay` has
    /// elapsed since the last admitted fetch to `host`.
    pub fn try_admit(&self, host: &str, min_delay: Duration) -> bool {
        match self.last_fetch.entry(host.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().elapsed() >= min_delay {
                    entry.insert(Instant::now());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_roundtrips_through_queue_payload() {
        let job = CrawlJob {
            url: "http://example.com/a".to_string(),
            depth: 3,
        };
        let payload = serde_json::to_string(&job).unwrap();
        let decoded: CrawlJob = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded.url, job.url);
        assert_eq!(decoded.depth, 3);
    }

    #[test]
    fn first_visit_to_a_host_is_admitted() {
        let politeness = HostPoliteness::new();
        assert!(politeness.try_admit("example.com", Duration::from_secs(1)));
    }

    #[test]
    fn second_visit_within_the_delay_is_refused() {
        let politeness = HostPoliteness::new();
        assert!(politeness.try_admit("example.com", Duration::from_millis(50)));
        assert!(!politeness.try_admit("example.com", Duration::from_millis(50)));
        // a different host is unaffected
        assert!(politeness.try_admit("other.com", Duration::from_millis(50)));
    }

    #[test]
    fn admission_reopens_after_the_delay() {
        let politeness = HostPoliteness::new();
        assert!(politeness.try_admit("example.com", Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(politeness.try_admit("example.com", Duration::from_millis(10)));
    }
}
