//! Request path normalization.
//!
//! # Responsibilities
//! - Split a request target into non-empty, percent-decoded path components
//! - Keep the raw query string and its decoded pairs
//! - Produce the canonical key used by caches (`/a/b?x=1`)

use percent_encoding::percent_decode_str;
use serde::Serialize;
use url::{form_urlencoded, Url};

/// Decoded query parameters, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchParams {
    raw: String,
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim_start_matches('?');
        Self {
            raw: raw.to_string(),
            pairs: form_urlencoded::parse(raw.as_bytes()).into_owned().collect(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A normalized request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    components: Vec<String>,
    search: SearchParams,
}

impl RequestPath {
    /// Parse an origin-form target such as `/blog/hello%20world?page=2`.
    pub fn parse(target: &str) -> Self {
        let target = target.split('#').next().unwrap_or_default();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        let components = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| percent_decode_str(c).decode_utf8_lossy().into_owned())
            .collect();

        Self {
            components,
            search: SearchParams::parse(query),
        }
    }

    pub fn from_url(url: &Url) -> Self {
        match url.query() {
            Some(query) => Self::parse(&format!("{}?{}", url.path(), query)),
            None => Self::parse(url.path()),
        }
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn search_params(&self) -> &SearchParams {
        &self.search
    }

    /// Decoded pathname, always starting with `/`.
    pub fn pathname(&self) -> String {
        format!("/{}", self.components.join("/"))
    }

    /// Canonical key for caches keyed by resolved path.
    pub fn cache_key(&self) -> String {
        if self.search.raw().is_empty() {
            self.pathname()
        } else {
            format!("{}?{}", self.pathname(), self.search.raw())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_components() {
        let path = RequestPath::parse("//blog///hello%20world/");
        assert_eq!(path.components(), &["blog".to_string(), "hello world".to_string()]);
        assert_eq!(path.pathname(), "/blog/hello world");
        assert_eq!(RequestPath::parse("/").components().len(), 0);
    }

    #[test]
    fn test_query_and_fragment() {
        let path = RequestPath::parse("/search?q=rust+lang&tag=a&tag=b#top");
        assert_eq!(path.search_params().get("q"), Some("rust lang"));
        assert_eq!(path.search_params().get_all("tag"), vec!["a", "b"]);
        assert_eq!(path.cache_key(), "/search?q=rust+lang&tag=a&tag=b");

        let path = RequestPath::parse("/docs#intro");
        assert_eq!(path.pathname(), "/docs");
        assert_eq!(path.cache_key(), "/docs");
    }

    #[test]
    fn test_from_url() {
        let url = Url::parse("http://localhost/shop/items?sort=asc").unwrap();
        let path = RequestPath::from_url(&url);
        assert_eq!(path.components(), &["shop".to_string(), "items".to_string()]);
        assert_eq!(path.search_params().get("sort"), Some("asc"));
    }
}
