use std::sync::Arc;

use dashmap::DashMap;
use reqwest::redirect;
use texting_robots::Robot;
use tracing::{debug, warn};
use url::Url;

use rse_core::{Config, CrawlError, FetchResponse};

const MAX_REDIRECTS: usize = 10;

/// HTTP fetcher with robots.txt enforcement.
///
/// robots.txt is fetched at most once per origin and the parsed rule set is
/// cached for the lifetime of the process. An unreachable or unparseable
/// robots.txt is treated as allow-all.
pub struct Fetcher {
    client: reqwest::Client,
    /// Product token used to select the robots.txt group ("RSE" for
    /// "RSE/1.0.0"); falls back to the `*` group inside the parser.
    robot_agent: String,
    timeout_secs: u64,
    robots: DashMap<String, Option<Arc<Robot>>>,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| CrawlError::Config(format!("http client: {e}")))?;

        let robot_agent = config
            .user_agent
            .split('/')
            .next()
            .unwrap_or(&config.user_agent)
            .to_string();

        Ok(Self {
            client,
            robot_agent,
            timeout_secs: config.http_timeout.as_secs(),
            robots: DashMap::new(),
        })
    }

    /// Fetch `url`, consulting robots.txt for its origin first.
    pub async fn fetch(&self, url: &Url) -> Result<FetchResponse, CrawlError> {
        if !self.allowed(url).await {
            return Err(CrawlError::Disallowed);
        }

        debug!(url = %url, "fetching");
        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().clone();
        if !resp.status().is_success() {
            return Err(CrawlError::Http(status));
        }

        let body = resp.bytes().await.map_err(|e| self.classify(e))?;
        Ok(FetchResponse {
            status,
            body: body.to_vec(),
            final_url,
        })
    }

    /// Whether robots.txt permits fetching `url` for the configured agent.
    pub async fn allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let origin = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        let rules = match self.robots.get(&origin) {
            Some(cached) => cached.clone(),
            None => {
                let fetched = self.fetch_robots(&origin).await;
                self.robots.entry(origin).or_insert(fetched).clone()
            }
        };

        match rules {
            Some(robot) => robot.allowed(url.as_str()),
            None => true,
        }
    }

    /// Fetch and parse robots.txt for an origin. `None` means no usable
    /// rule set was found and crawling is permitted.
    async fn fetch_robots(&self, origin: &str) -> Option<Arc<Robot>> {
        let robots_url = format!("{origin}/robots.txt");
        let resp = match self.client.get(&robots_url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url = %robots_url, error = %e, "robots.txt unreachable, allowing");
                return None;
            }
        };
        if !resp.status().is_success() {
            return None;
        }
        let body = resp.bytes().await.ok()?;
        match Robot::new(&self.robot_agent, &body) {
            Ok(robot) => Some(Arc::new(robot)),
            Err(e) => {
                warn!(url = %robots_url, error = %e, "robots.txt unparseable, allowing");
                None
            }
        }
    }

    /// Map a transport error onto a crawl error kind. reqwest surfaces the
    /// cause only through the error source chain, so classification matches
    /// on the collected messages.
    fn classify(&self, error: reqwest::Error) -> CrawlError {
        if error.is_timeout() {
            return CrawlError::Timeout(self.timeout_secs);
        }

        let mut message = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        let lower = message.to_lowercase();
        if lower.contains("dns")
            || lower.contains("name or service not known")
            || lower.contains("failed to lookup")
        {
            CrawlError::Dns(message)
        } else {
            CrawlError::Refused(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/rse".to_string(),
            queue_url: "redis://localhost".to_string(),
            seed_urls: Vec::new(),
            stop_words: HashSet::new(),
            crawling_workers: 1,
            processing_workers: 1,
            crawl_delay: Duration::from_secs(1),
            maximum_depth: -1,
            minimum_word_frequency: 1,
            maximum_word_frequency: 1024,
            minimum_word_length: 2,
            maximum_word_length: 128,
            user_agent: "RSE/1.0.0".to_string(),
            http_timeout: Duration::from_secs(5),
            listen_address: "127.0.0.1:0".to_string(),
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            revisit_delay: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn robots_disallow_blocks_the_fetch() {
        let mut server = mockito::Server::new_async().await;
        let robots = server
            .mock("GET", "/robots.txt")
            .with_body("User-agent: *\nDisallow: /private")
            .create_async()
            .await;
        let page = server
            .mock("GET", "/public")
            .with_body("<html><body>ok</body></html>")
            .create_async()
            .await;

        let fetcher = Fetcher::new(&test_config()).unwrap();
        let base = Url::parse(&server.url()).unwrap();

        let denied = fetcher.fetch(&base.join("/private/x").unwrap()).await;
        assert!(matches!(denied, Err(CrawlError::Disallowed)));

        let allowed = fetcher.fetch(&base.join("/public").unwrap()).await;
        assert!(allowed.is_ok());

        robots.assert_async().await;
        page.assert_async().await;
    }

    #[tokio::test]
    async fn missing_robots_is_permissive() {
        let mut server = mockito::Server::new_async().await;
        let _robots = server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;
        let _page = server
            .mock("GET", "/anything")
            .with_body("hi")
            .create_async()
            .await;

        let fetcher = Fetcher::new(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/anything", server.url())).unwrap();
        assert!(fetcher.fetch(&url).await.is_ok());
    }

    #[tokio::test]
    async fn robots_is_fetched_once_per_origin() {
        let mut server = mockito::Server::new_async().await;
        let robots = server
            .mock("GET", "/robots.txt")
            .with_body("User-agent: *\nAllow: /")
            .expect(1)
            .create_async()
            .await;
        let _a = server
            .mock("GET", "/a")
            .with_body("a")
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/b")
            .with_body("b")
            .create_async()
            .await;

        let fetcher = Fetcher::new(&test_config()).unwrap();
        let base = Url::parse(&server.url()).unwrap();
        fetcher.fetch(&base.join("/a").unwrap()).await.unwrap();
        fetcher.fetch(&base.join("/b").unwrap()).await.unwrap();

        robots.assert_async().await;
    }

    #[tokio::test]
    async fn http_errors_preserve_the_status_code() {
        let mut server = mockito::Server::new_async().await;
        let _robots = server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;
        let _gone = server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/broken")
            .with_status(503)
            .create_async()
            .await;

        let fetcher = Fetcher::new(&test_config()).unwrap();
        let base = Url::parse(&server.url()).unwrap();

        let gone = fetcher.fetch(&base.join("/gone").unwrap()).await;
        let Err(err) = gone else { panic!("expected error") };
        assert!(matches!(err, CrawlError::Http(404)));
        assert!(!err.is_retryable());

        let broken = fetcher.fetch(&base.join("/broken").unwrap()).await;
        let Err(err) = broken else { panic!("expected error") };
        assert!(matches!(err, CrawlError::Http(503)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn redirects_are_followed_and_reported() {
        let mut server = mockito::Server::new_async().await;
        let _robots = server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;
        let _old = server
            .mock("GET", "/old")
            .with_status(301)
            .with_header("location", "/new")
            .create_async()
            .await;
        let _new = server
            .mock("GET", "/new")
            .with_body("moved")
            .create_async()
            .await;

        let fetcher = Fetcher::new(&test_config()).unwrap();
        let base = Url::parse(&server.url()).unwrap();
        let resp = fetcher.fetch(&base.join("/old").unwrap()).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.final_url.path(), "/new");
        assert_eq!(resp.body, b"moved");
    }
}
