//! The single upstream origin every request is forwarded to

use std::fmt;

/// Base URL of the upstream API, stored without trailing slashes.
///
/// Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    base: String,
}

impl ProxyTarget {
    pub fn new(url: &str) -> Self {
        Self {
            base: url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Build the forwarding URL for an inbound path and query.
    ///
    /// Exactly one `/` separates base and path no matter how many slashes
    /// either side carries. The query string is appended unmodified.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slashes_are_dropped() {
        assert_eq!(
            ProxyTarget::new("https://x.example/v1///").as_str(),
            "https://x.example/v1"
        );
    }

    #[test]
    fn test_join_ignores_leading_slash() {
        let target = ProxyTarget::new("https://x.example/v1");
        assert_eq!(target.url_for("/chat", None), "https://x.example/v1/chat");
        assert_eq!(target.url_for("chat", None), "https://x.example/v1/chat");

        let slashed = ProxyTarget::new("https://x.example/v1/");
        assert_eq!(slashed.url_for("//chat", None), "https://x.example/v1/chat");
    }

    #[test]
    fn test_query_is_kept_verbatim() {
        let target = ProxyTarget::new("https://x.example/v1");
        assert_eq!(
            target.url_for("/models", Some("a=1&b=%20x")),
            "https://x.example/v1/models?a=1&b=%20x"
        );
        assert_eq!(
            target.url_for("/models", Some("")),
            "https://x.example/v1/models"
        );
    }

    #[test]
    fn test_root_path() {
        let target = ProxyTarget::new("http://127.0.0.1:9000");
        assert_eq!(target.url_for("/", None), "http://127.0.0.1:9000/");
    }
}
