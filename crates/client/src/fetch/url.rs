//! URL resolution for consistent cache keys.
//!
//! Every request URL is resolved against the configured origin before it is
//! routed or used as a cache key, so `/offline.html` and
//! `http://localhost:8080/offline.html` address the same entry.

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a possibly root-relative URL against `origin`.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Join relative references onto the origin
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
///
/// Non-http schemes are returned as-is; the router decides what to do with them.
pub fn resolve(origin: &url::Url, input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            parsed
                .set_host(Some(&lowered))
                .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
        }
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Whether the URL uses a scheme the worker intercepts.
pub fn is_http(url: &url::Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> url::Url {
        url::Url::parse("https://casa.test").unwrap()
    }

    #[test]
    fn test_resolve_root_relative() {
        let url = resolve(&origin(), "/offline.html").unwrap();
        assert_eq!(url.as_str(), "https://casa.test/offline.html");
    }

    #[test]
    fn test_resolve_absolute_keeps_host() {
        let url = resolve(&origin(), "https://images.example.com/photo.jpg").unwrap();
        assert_eq!(url.host_str(), Some("images.example.com"));
    }

    #[test]
    fn test_resolve_lowercase_host() {
        let url = resolve(&origin(), "https://CASA.TEST/About").unwrap();
        assert_eq!(url.as_str(), "https://casa.test/About");
    }

    #[test]
    fn test_resolve_remove_fragment() {
        let url = resolve(&origin(), "/properties#gallery").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path(), "/properties");
    }

    #[test]
    fn test_resolve_preserve_query() {
        let url = resolve(&origin(), "/search?city=casablanca&beds=3").unwrap();
        assert_eq!(url.query(), Some("city=casablanca&beds=3"));
    }

    #[test]
    fn test_resolve_trim_whitespace() {
        let url = resolve(&origin(), "  /  ").unwrap();
        assert_eq!(url.as_str(), "https://casa.test/");
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(&origin(), ""), Err(UrlError::Empty)));
        assert!(matches!(resolve(&origin(), "   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_non_http_scheme_detected() {
        let url = resolve(&origin(), "chrome-extension://abcdef/script.js").unwrap();
        assert!(!is_http(&url));
        assert!(is_http(&resolve(&origin(), "/").unwrap()));
    }
}
