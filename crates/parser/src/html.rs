use std::collections::HashMap;

use scraper::{Html, Node, Selector};
use url::Url;

use rse_core::{normalize_url, ExtractedPage, OutLink};

use crate::keywords::KeywordExtractor;

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// Subtrees whose text is never visible to a reader.
const SKIPPED_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// Parse an HTML document and pull out everything the crawler persists:
/// title, meta description, outbound links with per-page anchor counts,
/// and the filtered keyword counts of the visible text.
///
/// The parse is lenient; malformed input degrades to whatever the tree
/// builder recovers, never to an error.
pub fn extract(base_url: &Url, body: &[u8], keywords: &KeywordExtractor) -> ExtractedPage {
    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);

    let title = first_text(&document, "title").map(|t| truncate(&t, MAX_TITLE_LEN));
    let description = meta_description(&document).map(|d| truncate(&d, MAX_DESCRIPTION_LEN));
    let links = extract_links(&document, base_url);
    let keywords = keywords.extract(&visible_text(&document));

    ExtractedPage {
        title,
        description,
        links,
        keywords,
    }
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn first_text(document: &Html, sel: &str) -> Option<String> {
    selector(sel)
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `content` of the first `<meta>` whose `name` is "description", matched
/// case-insensitively.
fn meta_description(document: &Html) -> Option<String> {
    let sel = selector("meta")?;
    document
        .select(&sel)
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|name| name.eq_ignore_ascii_case("description"))
        })
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<OutLink> {
    let Some(sel) = selector("a[href]") else {
        return Vec::new();
    };
    let page_url = normalize_url(base_url);
    let mut counts: HashMap<String, u32> = HashMap::new();

    for el in document.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base_url.join(href.trim()) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        if resolved.fragment().is_some_and(|f| !f.is_empty()) {
            continue;
        }
        let normalized = normalize_url(&resolved);
        if normalized == page_url {
            continue;
        }
        *counts.entry(normalized.to_string()).or_insert(0) += 1;
    }

    let mut links: Vec<OutLink> = counts
        .into_iter()
        .map(|(url, frequency)| OutLink { url, frequency })
        .collect();
    links.sort_by(|a, b| a.url.cmp(&b.url));
    links
}

/// Collect the document's visible text with an explicit work stack,
/// skipping script/style subtrees entirely.
fn visible_text(document: &Html) -> String {
    let mut text = String::new();
    let mut stack = vec![document.tree.root()];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Element(el) if SKIPPED_ELEMENTS.contains(&el.name()) => continue,
            Node::Text(t) => {
                text.push_str(t);
                text.push(' ');
            }
            _ => {}
        }
        for child in node.children() {
            stack.push(child);
        }
    }
    text
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
