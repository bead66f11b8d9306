use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// A unit of crawl work. Serialized as-is onto the queue so depth survives
/// restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub url: String,
    pub depth: u32,
}

impl CrawlJob {
    pub fn seed(url: &Url) -> Self {
        Self {
            url: url.to_string(),
            depth: 0,
        }
    }
}

/// A successful HTTP response. `final_url` is the last hop after redirects.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub final_url: Url,
}

/// An outbound link with its anchor count on the source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutLink {
    pub url: String,
    pub frequency: u32,
}

/// Everything the extractor pulls out of one page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub links: Vec<OutLink>,
    pub keywords: HashMap<String, u32>,
}
