use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("dns lookup failed: {0}")]
    Dns(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Refused(String),

    #[error("http status {0}")]
    Http(u16),

    #[error("disallowed by robots.txt")]
    Disallowed,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("bad query: {0}")]
    BadQuery(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// Transient fetch failures that warrant another attempt: timeouts,
    /// refused connections, and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            CrawlError::Timeout(_) | CrawlError::Refused(_) => true,
            CrawlError::Http(status) => (500..600).contains(status),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert!(CrawlError::Http(500).is_retryable());
        assert!(CrawlError::Http(503).is_retryable());
        assert!(CrawlError::Timeout(10).is_retryable());
        assert!(CrawlError::Refused("connection refused".into()).is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!CrawlError::Http(404).is_retryable());
        assert!(!CrawlError::Http(403).is_retryable());
        assert!(!CrawlError::Dns("no such host".into()).is_retryable());
        assert!(!CrawlError::Disallowed.is_retryable());
    }
}
