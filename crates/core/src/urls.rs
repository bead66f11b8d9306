use url::Url;

/// Canonical form of a URL for queueing, dedup, and the `pages.url` key.
///
/// `Url::parse` already lowercases the host, strips default ports, resolves
/// `.`/`..` segments, and percent-encodes reserved characters; on top of
/// that the fragment and any trailing path slash are dropped.
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    if normalized.path().len() > 1 && normalized.path().ends_with('/') {
        let trimmed = normalized.path().trim_end_matches('/').to_string();
        normalized.set_path(&trimmed);
    }
    normalized
}
