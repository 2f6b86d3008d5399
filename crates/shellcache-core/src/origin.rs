//! Mapping between absolute request URLs and logical manifest keys.

use std::fmt;

use url::Url;

use crate::error::{CacheError, CacheResult};

/// Logical key of the origin root document.
pub const ROOT_KEY: &str = "/";

/// Query parameter appended by the app for cache-busting.
const CACHE_BUST_MARKER: &str = "?v=";

/// Serialized origin (`scheme://host[:port]`, no trailing slash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(String);

impl Origin {
    pub fn parse(input: &str) -> CacheResult<Self> {
        let url = Url::parse(input)
            .map_err(|e| CacheError::InvalidOrigin(format!("{}: {}", input, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CacheError::InvalidOrigin(format!(
                "{}: scheme must be http or https",
                input
            )));
        }
        Ok(Self(url.origin().ascii_serialization()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL relative to the origin, without its leading slash.
    fn relative<'a>(&self, url: &'a str) -> &'a str {
        let rest = url.strip_prefix(self.0.as_str()).unwrap_or(url);
        rest.strip_prefix('/').unwrap_or(rest)
    }

    /// Key of a stored cache entry. An empty path is the root key.
    pub fn resource_key(&self, url: &str) -> String {
        match self.relative(url) {
            "" => ROOT_KEY.to_string(),
            key => key.to_string(),
        }
    }

    /// Key of an intercepted request. Drops the cache-busting query and
    /// collapses the bare origin and fragment-only navigations to the root.
    pub fn request_key(&self, url: &str) -> String {
        let mut key = self.relative(url);
        if let Some((head, _)) = key.split_once(CACHE_BUST_MARKER) {
            key = head;
        }
        let fragment_nav = url
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with("/#"));
        if url == self.0 || fragment_nav || key.is_empty() {
            return ROOT_KEY.to_string();
        }
        key.to_string()
    }

    /// Absolute URL for a manifest key.
    pub fn resolve(&self, key: &str) -> String {
        if key == ROOT_KEY {
            format!("{}/", self.0)
        } else {
            format!("{}/{}", self.0, key.trim_start_matches('/'))
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::parse("https://app.example.com").unwrap()
    }

    #[test]
    fn test_parse_strips_path_and_trailing_slash() {
        let o = Origin::parse("https://app.example.com/some/page?x=1").unwrap();
        assert_eq!(o.as_str(), "https://app.example.com");
        let with_port = Origin::parse("http://localhost:8080/").unwrap();
        assert_eq!(with_port.as_str(), "http://localhost:8080");
    }

    #[test]
    fn test_parse_rejects_non_http() {
        assert!(Origin::parse("file:///tmp/index.html").is_err());
        assert!(Origin::parse("not a url").is_err());
    }

    #[test]
    fn test_resource_key() {
        let o = origin();
        assert_eq!(o.resource_key("https://app.example.com/"), "/");
        assert_eq!(o.resource_key("https://app.example.com"), "/");
        assert_eq!(o.resource_key("https://app.example.com/main.js"), "main.js");
        assert_eq!(
            o.resource_key("https://app.example.com/assets/a.png"),
            "assets/a.png"
        );
    }

    #[test]
    fn test_request_key_root_forms() {
        let o = origin();
        assert_eq!(o.request_key("https://app.example.com"), "/");
        assert_eq!(o.request_key("https://app.example.com/"), "/");
        assert_eq!(o.request_key("https://app.example.com/#/settings"), "/");
        assert_eq!(o.request_key("https://app.example.com/?v=123"), "/");
    }

    #[test]
    fn test_request_key_strips_cache_bust() {
        let o = origin();
        assert_eq!(o.request_key("https://app.example.com/main.js?v=42"), "main.js");
        assert_eq!(o.request_key("https://app.example.com/main.js"), "main.js");
        // Other queries are part of the key
        assert_eq!(
            o.request_key("https://app.example.com/main.js?lang=en"),
            "main.js?lang=en"
        );
    }

    #[test]
    fn test_resolve() {
        let o = origin();
        assert_eq!(o.resolve("/"), "https://app.example.com/");
        assert_eq!(o.resolve("index.html"), "https://app.example.com/index.html");
        assert_eq!(o.resolve("/icons/a.png"), "https://app.example.com/icons/a.png");
    }

    #[test]
    fn test_resolve_round_trips_through_resource_key() {
        let o = origin();
        for key in ["/", "index.html", "assets/fonts/x.otf"] {
            assert_eq!(o.resource_key(&o.resolve(key)), key);
        }
    }
}
