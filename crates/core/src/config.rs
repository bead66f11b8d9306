use std::collections::HashSet;
use std::time::Duration;

use crate::error::CrawlError;

/// Process-wide configuration, read once at startup and threaded through
/// constructors. Every option has a default except the two connection
/// strings.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub queue_url: String,
    pub seed_urls: Vec<String>,
    pub stop_words: HashSet<String>,
    pub crawling_workers: usize,
    pub processing_workers: usize,
    pub crawl_delay: Duration,
    /// Maximum crawl depth; -1 means unbounded.
    pub maximum_depth: i64,
    pub minimum_word_frequency: u32,
    pub maximum_word_frequency: u32,
    pub minimum_word_length: usize,
    pub maximum_word_length: usize,
    pub user_agent: String,
    pub http_timeout: Duration,
    pub listen_address: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub revisit_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, CrawlError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, CrawlError> {
        let required = |key: &str| {
            get(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CrawlError::Config(format!("{key} is not set")))
        };
        let list = |key: &str| -> Vec<String> {
            get(key)
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        let secs = |key: &str, default: u64| Duration::from_secs(parse_or(get(key), default));

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            queue_url: required("QUEUE_URL")?,
            seed_urls: list("SEED_URLS"),
            stop_words: list("STOP_WORDS").into_iter().collect(),
            crawling_workers: parse_or(get("CRAWLING_WORKERS"), 1),
            processing_workers: parse_or(get("PROCESSING_WORKERS"), 1),
            crawl_delay: secs("CRAWL_DELAY", 1),
            maximum_depth: parse_or(get("MAXIMUM_DEPTH"), -1),
            minimum_word_frequency: parse_or(get("MINIMUM_WORD_FREQUENCY"), 1),
            maximum_word_frequency: parse_or(get("MAXIMUM_WORD_FREQUENCY"), 1024),
            minimum_word_length: parse_or(get("MINIMUM_WORD_LENGTH"), 2),
            maximum_word_length: parse_or(get("MAXIMUM_WORD_LENGTH"), 128),
            user_agent: get("USER_AGENT")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "RSE/1.0.0".to_string()),
            http_timeout: secs("HTTP_TIMEOUT", 10),
            listen_address: get("LISTEN_ADDRESS")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            max_retries: parse_or(get("MAX_RETRIES"), 3),
            retry_delay: secs("RETRY_DELAY", 5),
            revisit_delay: secs("REVISIT_DELAY", 3600),
        })
    }

    /// Whether a URL at `depth` may still be enqueued.
    pub fn depth_allowed(&self, depth: u32) -> bool {
        self.maximum_depth < 0 || i64::from(depth) <= self.maximum_depth
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, CrawlError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/rse"),
            ("QUEUE_URL", "redis://localhost"),
        ])
        .unwrap();

        assert_eq!(config.crawling_workers, 1);
        assert_eq!(config.crawl_delay, Duration::from_secs(1));
        assert_eq!(config.maximum_depth, -1);
        assert_eq!(config.maximum_word_frequency, 1024);
        assert_eq!(config.user_agent, "RSE/1.0.0");
        assert_eq!(config.listen_address, "0.0.0.0:8080");
        assert!(config.seed_urls.is_empty());
        assert!(config.stop_words.is_empty());
    }

    #[test]
    fn missing_database_url_is_a_config_error() {
        let err = config_from(&[("QUEUE_URL", "redis://localhost")]).unwrap_err();
        assert!(matches!(err, CrawlError::Config(_)));
    }

    #[test]
    fn lists_split_on_commas_and_trim() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/rse"),
            ("QUEUE_URL", "redis://localhost"),
            ("SEED_URLS", "http://a.example/, http://b.example/ ,"),
            ("STOP_WORDS", "the, a,an"),
        ])
        .unwrap();

        assert_eq!(config.seed_urls.len(), 2);
        assert!(config.stop_words.contains("the"));
        assert!(config.stop_words.contains("an"));
        assert_eq!(config.stop_words.len(), 3);
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/rse"),
            ("QUEUE_URL", "redis://localhost"),
            ("CRAWLING_WORKERS", "lots"),
            ("MAXIMUM_DEPTH", "3"),
        ])
        .unwrap();

        assert_eq!(config.crawling_workers, 1);
        assert_eq!(config.maximum_depth, 3);
    }

    #[test]
    fn depth_bound() {
        let mut config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/rse"),
            ("QUEUE_URL", "redis://localhost"),
        ])
        .unwrap();

        assert!(config.depth_allowed(0));
        assert!(config.depth_allowed(10_000));

        config.maximum_depth = 1;
        assert!(config.depth_allowed(1));
        assert!(!config.depth_allowed(2));
    }
}
