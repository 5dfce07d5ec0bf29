//! Request classification.
//!
//! Maps a request URL to whether it targets the remote data API and, if so,
//! which resource. Classification never fails: anything that cannot be
//! parsed is a static asset with no resource.

use url::Url;

/// Classifier settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Hosts serving the remote data API. Subdomains match too.
    pub api_hosts: Vec<String>,
    /// Path prefix preceding the resource identifier, e.g. `/rest/v1/`.
    pub api_prefix: String,
}

/// Outcome of classifying one request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_remote_api: bool,
    pub resource_id: Option<String>,
}

impl Classification {
    pub fn static_asset() -> Self {
        Self { is_remote_api: false, resource_id: None }
    }
}

/// Pure URL classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify a raw URL string.
    pub fn classify(&self, url: &str) -> Classification {
        match Url::parse(url.trim()) {
            Ok(parsed) => self.classify_url(&parsed),
            Err(_) => Classification::static_asset(),
        }
    }

    /// Classify an already parsed URL.
    pub fn classify_url(&self, url: &Url) -> Classification {
        let Some(host) = url.host_str() else {
            return Classification::static_asset();
        };
        if !self.is_api_host(host) {
            return Classification::static_asset();
        }

        Classification { is_remote_api: true, resource_id: self.resource_from_path(url.path()) }
    }

    /// First path segment after the API prefix, if any.
    ///
    /// `Url::path` never includes the query string, so `/rest/v1/spells?select=*`
    /// yields `spells`.
    pub fn resource_from_path(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix(self.config.api_prefix.as_str())?;
        let segment = rest.split('/').next()?;
        if segment.is_empty() { None } else { Some(segment.to_string()) }
    }

    fn is_api_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.config.api_hosts.iter().any(|api| {
            let api = api.trim().to_ascii_lowercase();
            host == api || host.strip_suffix(api.as_str()).is_some_and(|sub| sub.ends_with('.'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(ClassifierConfig {
            api_hosts: vec!["supabase.co".into(), "supabase.io".into()],
            api_prefix: "/rest/v1/".into(),
        })
    }

    #[test]
    fn test_api_resource_with_query() {
        let c = classifier().classify("https://abcd.supabase.co/rest/v1/spells?select=*&level=eq.3");
        assert!(c.is_remote_api);
        assert_eq!(c.resource_id.as_deref(), Some("spells"));
    }

    #[test]
    fn test_api_resource_first_segment_only() {
        let c = classifier().classify("https://abcd.supabase.co/rest/v1/characters/42");
        assert_eq!(c.resource_id.as_deref(), Some("characters"));
    }

    #[test]
    fn test_api_host_outside_prefix() {
        let c = classifier().classify("https://abcd.supabase.co/auth/v1/token?grant_type=refresh_token");
        assert!(c.is_remote_api);
        assert_eq!(c.resource_id, None);
    }

    #[test]
    fn test_api_prefix_without_resource() {
        let c = classifier().classify("https://abcd.supabase.co/rest/v1/");
        assert!(c.is_remote_api);
        assert_eq!(c.resource_id, None);
    }

    #[test]
    fn test_host_matching_is_suffix_aware() {
        let c = classifier();
        assert!(c.classify("https://SUPABASE.CO/rest/v1/spells").is_remote_api);
        assert!(c.classify("https://x.supabase.io/rest/v1/spells").is_remote_api);
        assert!(!c.classify("https://notsupabase.co/rest/v1/spells").is_remote_api);
        assert!(!c.classify("https://supabase.co.evil.com/rest/v1/spells").is_remote_api);
    }

    #[test]
    fn test_static_asset() {
        let c = classifier().classify("http://localhost:5173/assets/index-abc.js");
        assert_eq!(c, Classification::static_asset());
    }

    #[test]
    fn test_unparseable_url_is_static() {
        let c = classifier();
        assert_eq!(c.classify(""), Classification::static_asset());
        assert_eq!(c.classify("not a url"), Classification::static_asset());
        assert_eq!(c.classify("http://[::1"), Classification::static_asset());
        assert_eq!(c.classify("data:text/plain,hello"), Classification::static_asset());
    }
}
