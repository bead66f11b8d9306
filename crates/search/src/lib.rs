use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;

use rse_parser::TermFilter;

/// Damping factor applied to the inbound-relevance sum.
const DAMPING: f64 = 0.85;
/// Authority of a candidate no other candidate links to.
const BASE_AUTHORITY: f64 = 1.0;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub page_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub score: f64,
}

/// A page retrieved by keyword match, before scoring.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub page_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: HashMap<String, u32>,
}

pub struct QueryEngine {
    pool: PgPool,
    terms: TermFilter,
}

impl QueryEngine {
    pub fn new(pool: PgPool, terms: TermFilter) -> Self {
        Self { pool, terms }
    }

    /// Answer a free-text query with the full ranked result list. An empty
    /// or all-stop-word query yields an empty list, not an error.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let query_terms = self.terms.terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }
        let words: Vec<String> = query_terms.keys().cloned().collect();

        let pages: Vec<(i64, String, Option<String>, Option<String>)> = sqlx::query_as(
            r#"SELECT DISTINCT p.id, p.url, p.title, p.description
               FROM pages p
               JOIN keywords k ON k.page_id = p.id
               WHERE k.word = ANY($1)
               ORDER BY p.id"#,
        )
        .bind(&words)
        .fetch_all(&self.pool)
        .await?;
        if pages.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = pages.iter().map(|p| p.0).collect();

        let keyword_rows: Vec<(i64, String, i32)> = sqlx::query_as(
            "SELECT page_id, word, frequency FROM keywords WHERE page_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut keywords_by_page: HashMap<i64, HashMap<String, u32>> = HashMap::new();
        for (page_id, word, frequency) in keyword_rows {
            keywords_by_page
                .entry(page_id)
                .or_default()
                .insert(word, frequency.max(0) as u32);
        }

        // Edges between candidates; link targets are stored as URLs and
        // resolved through pages.url here.
        let edges: Vec<(i64, i64)> = sqlx::query_as(
            r#"SELECT fl.from_page_id, p.id
               FROM forward_links fl
               JOIN pages p ON p.url = fl.to_url
               WHERE fl.from_page_id = ANY($1) AND p.id = ANY($1)"#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let outdegree: HashMap<i64, i64> = sqlx::query_as(
            "SELECT from_page_id, COUNT(*) FROM forward_links
             WHERE from_page_id = ANY($1) GROUP BY from_page_id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        let candidates: Vec<Candidate> = pages
            .into_iter()
            .map(|(page_id, url, title, description)| Candidate {
                page_id,
                url,
                title,
                description,
                keywords: keywords_by_page.remove(&page_id).unwrap_or_default(),
            })
            .collect();

        Ok(rank(candidates, &query_terms, &edges, &outdegree))
    }
}

/// Score and order candidates: relevance against the query multiset plus a
/// single-pass authority boost from candidate in-neighbors. Ties are broken
/// by ascending page id so the order is total.
pub fn rank(
    candidates: Vec<Candidate>,
    query: &HashMap<String, u32>,
    edges: &[(i64, i64)],
    outdegree: &HashMap<i64, i64>,
) -> Vec<SearchHit> {
    let relevance: HashMap<i64, f64> = candidates
        .iter()
        .map(|c| (c.page_id, relevance_of(&c.keywords, query)))
        .collect();

    let mut inbound: HashMap<i64, Vec<i64>> = HashMap::new();
    for (from, to) in edges {
        if from != to {
            inbound.entry(*to).or_default().push(*from);
        }
    }

    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|c| {
            let rel = relevance.get(&c.page_id).copied().unwrap_or(0.0);
            let auth = match inbound.get(&c.page_id) {
                None => BASE_AUTHORITY,
                Some(sources) => {
                    DAMPING
                        * sources
                            .iter()
                            .map(|q| {
                                let outdeg =
                                    outdegree.get(q).copied().unwrap_or(0).max(1) as f64;
                                relevance.get(q).copied().unwrap_or(0.0) / outdeg
                            })
                            .sum::<f64>()
                }
            };
            SearchHit {
                page_id: c.page_id,
                url: c.url,
                title: c.title,
                description: c.description,
                score: rel + auth,
            }
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.page_id.cmp(&b.page_id)));
    hits
}

fn relevance_of(keywords: &HashMap<String, u32>, query: &HashMap<String, u32>) -> f64 {
    query
        .iter()
        .map(|(word, query_freq)| {
            keywords
                .get(word)
                .map_or(0.0, |page_freq| f64::from(*query_freq) * f64::from(*page_freq))
        })
        .sum()
}
