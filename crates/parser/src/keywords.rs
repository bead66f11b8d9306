use std::collections::{HashMap, HashSet};

use rust_stemmers::{Algorithm, Stemmer};

use rse_core::Config;

/// Shared token pipeline for indexing and query parsing: lowercase,
/// Porter-stem, then drop stop words and out-of-bounds lengths.
///
/// Stop words are checked against both the surface form and the stem, so a
/// configured stop word filters its inflections too.
pub struct TermFilter {
    stemmer: Stemmer,
    stop_words: HashSet<String>,
    min_len: usize,
    max_len: usize,
}

impl TermFilter {
    pub fn new(stop_words: HashSet<String>, min_len: usize, max_len: usize) -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            stop_words,
            min_len,
            max_len,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.stop_words.clone(),
            config.minimum_word_length,
            config.maximum_word_length,
        )
    }

    /// Normalize one raw token; `None` when it is filtered out.
    pub fn normalize(&self, token: &str) -> Option<String> {
        let lowered = token.to_lowercase();
        if lowered.is_empty() || self.stop_words.contains(&lowered) {
            return None;
        }
        let stemmed = self.stemmer.stem(&lowered).into_owned();
        if self.stop_words.contains(&stemmed) {
            return None;
        }
        let len = stemmed.chars().count();
        if len < self.min_len || len > self.max_len {
            return None;
        }
        Some(stemmed)
    }

    /// Split free text into a term multiset.
    pub fn terms(&self, text: &str) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if let Some(term) = self.normalize(token) {
                *counts.entry(term).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Keyword extraction for indexing: the term multiset with the configured
/// frequency floor applied and counts clamped to the ceiling.
pub struct KeywordExtractor {
    filter: TermFilter,
    min_freq: u32,
    max_freq: u32,
}

impl KeywordExtractor {
    pub fn new(filter: TermFilter, min_freq: u32, max_freq: u32) -> Self {
        Self {
            filter,
            min_freq,
            max_freq,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            TermFilter::from_config(config),
            config.minimum_word_frequency,
            config.maximum_word_frequency,
        )
    }

    pub fn extract(&self, text: &str) -> HashMap<String, u32> {
        let mut counts = self.filter.terms(text);
        counts.retain(|_, freq| *freq >= self.min_freq);
        for freq in counts.values_mut() {
            *freq = (*freq).min(self.max_freq);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(stop_words: &[&str]) -> TermFilter {
        TermFilter::new(stop_words.iter().map(|s| s.to_string()).collect(), 2, 128)
    }

    #[test]
    fn tokens_are_lowercased_and_stemmed() {
        let filter = filter(&[]);
        assert_eq!(filter.normalize("Running"), Some("run".to_string()));
        assert_eq!(filter.normalize("CATS"), Some("cat".to_string()));
        assert_eq!(filter.normalize("hello"), Some("hello".to_string()));
    }

    #[test]
    fn stop_words_are_dropped_before_and_after_stemming() {
        let filter = filter(&["the", "run"]);
        assert_eq!(filter.normalize("the"), None);
        assert_eq!(filter.normalize("The"), None);
        // "running" stems to the stop word "run"
        assert_eq!(filter.normalize("running"), None);
    }

    #[test]
    fn length_bounds_apply_to_the_stem() {
        let filter = TermFilter::new(HashSet::new(), 3, 5);
        assert_eq!(filter.normalize("at"), None);
        assert_eq!(filter.normalize("cat"), Some("cat".to_string()));
        assert_eq!(filter.normalize("extraordinary"), None);
    }

    #[test]
    fn terms_count_occurrences_across_punctuation() {
        let filter = filter(&[]);
        let counts = filter.terms("Hello, world! hello... world-hello");
        assert_eq!(counts.get("hello"), Some(&3));
        assert_eq!(counts.get("world"), Some(&2));
    }

    #[test]
    fn frequency_floor_removes_rare_words() {
        let extractor = KeywordExtractor::new(filter(&[]), 2, 1024);
        let counts = extractor.extract("alpha alpha beta");
        assert_eq!(counts.get("alpha"), Some(&2));
        assert!(!counts.contains_key("beta"));
    }

    #[test]
    fn frequency_ceiling_clamps_counts() {
        let extractor = KeywordExtractor::new(filter(&[]), 1, 3);
        let counts = extractor.extract("echo echo echo echo echo");
        assert_eq!(counts.get("echo"), Some(&3));
    }

    #[test]
    fn query_of_only_stop_words_is_empty() {
        let filter = filter(&["the", "a"]);
        assert!(filter.terms("the a THE").is_empty());
    }
}
