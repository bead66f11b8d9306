use rand::seq::SliceRandom;
use url::Url;

use rse_core::normalize_url;

/// Parse the configured seed list, dropping anything that is not an
/// absolute http(s) URL.
pub fn parse_seeds(raw: &[String]) -> Vec<Url> {
    raw.iter()
        .filter_map(|s| Url::parse(s).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| normalize_url(&u))
        .collect()
}

pub fn pick_seed(seeds: &[Url]) -> Option<&Url> {
    seeds.choose(&mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_and_non_http_seeds_are_dropped() {
        let raw = vec![
            "http://a.example/".to_string(),
            "not a url".to_string(),
            "ftp://b.example/".to_string(),
            "https://C.Example/path/".to_string(),
        ];
        let seeds = parse_seeds(&raw);
        let urls: Vec<String> = seeds.iter().map(Url::to_string).collect();
        assert_eq!(urls, ["http://a.example/", "https://c.example/path"]);
    }

    #[test]
    fn picking_from_an_empty_list_is_none() {
        assert!(pick_seed(&[]).is_none());
    }
}
