//! URL canonicalization so equal requests map to one cache key.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for spellcache_core::Error {
    fn from(err: UrlError) -> Self {
        spellcache_core::Error::InvalidUrl(err.to_string())
    }
}

/// Canonicalize an absolute request URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Lowercase the host
/// 3. Remove fragment (#...)
/// 4. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    check_scheme(&parsed)?;

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Resolve a root-relative path (e.g. `/index.html`) against an origin and canonicalize it.
pub fn resolve(origin: &Url, path: &str) -> Result<Url, UrlError> {
    let joined = origin
        .join(path.trim())
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    canonicalize(joined.as_str())
}

fn check_scheme(url: &Url) -> Result<(), UrlError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("https://ABC.Supabase.CO/rest/v1/spells").unwrap();
        assert_eq!(url.host_str(), Some("abc.supabase.co"));
        assert_eq!(url.path(), "/rest/v1/spells");
    }

    #[test]
    fn test_canonicalize_remove_fragment() {
        let url = canonicalize("http://localhost:5173/#/spells").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.as_str(), "http://localhost:5173/");
    }

    #[test]
    fn test_canonicalize_preserve_query() {
        let url = canonicalize("https://x.supabase.co/rest/v1/spells?select=*&level=eq.1").unwrap();
        assert_eq!(url.query(), Some("select=*&level=eq.1"));
    }

    #[test]
    fn test_canonicalize_trim_whitespace() {
        let url = canonicalize("  https://example.com  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_canonicalize_requires_absolute() {
        assert!(matches!(canonicalize("/index.html"), Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_resolve_root_relative() {
        let origin = Url::parse("http://localhost:5173").unwrap();
        assert_eq!(resolve(&origin, "/").unwrap().as_str(), "http://localhost:5173/");
        assert_eq!(resolve(&origin, "/index.html").unwrap().as_str(), "http://localhost:5173/index.html");
        assert_eq!(resolve(&origin, "/manifest.json").unwrap().as_str(), "http://localhost:5173/manifest.json");
    }

    #[test]
    fn test_error_converts_to_invalid_url() {
        let err: spellcache_core::Error = UrlError::Empty.into();
        assert!(err.to_string().starts_with("INVALID_URL"));
    }
}
