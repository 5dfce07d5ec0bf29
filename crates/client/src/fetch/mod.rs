//! Network side of the cache: forwarding intercepted requests upstream.
//!
//! ### URL Canonicalization
//! - Trim whitespace, require an absolute http(s) URL
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 10MB (configurable)
//! - Request timeout: 20s (configurable)
//!
//! Non-2xx answers are returned as responses, not errors. Only transport
//! failures (DNS, refused connection, timeout, truncated body) surface as
//! [`Error::NetworkUnavailable`].

pub mod url;

use crate::http::{HttpRequest, HttpResponse, is_hop_by_hop};
use reqwest::Client;
use reqwest::header::HeaderMap;
use spellcache_core::{AppConfig, Error};
use std::time::{Duration, Instant};

pub use url::{UrlError, canonicalize, resolve};

/// Anything that can answer a request over the network.
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, Error>;
}

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "spellcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "spellcache/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Self::default()
        }
    }
}

/// reqwest-backed [`Upstream`].
pub struct HttpUpstream {
    http: Client,
    config: FetchConfig,
}

impl HttpUpstream {
    /// Create a new upstream client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn too_large(&self, len: usize) -> Error {
        Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes))
    }
}

#[async_trait::async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let start = Instant::now();
        let url = canonicalize(&request.url)?;

        let mut builder = self
            .http
            .request(request.method.clone(), url.as_str())
            .headers(forwardable(&request.headers));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::NetworkUnavailable(format!("timed out after {:?}", self.config.timeout))
            } else {
                Error::NetworkUnavailable(format!("network error: {}", e))
            }
        })?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        let headers = forwardable(response.headers());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::NetworkUnavailable(format!("failed to read response: {}", e)))?;

        if bytes.len() > self.config.max_bytes {
            return Err(self.too_large(bytes.len()));
        }

        tracing::debug!(
            "{} {} -> {} in {}ms ({} bytes)",
            request.method,
            url,
            status.as_u16(),
            start.elapsed().as_millis(),
            bytes.len()
        );

        Ok(HttpResponse::new(status, headers, bytes))
    }
}

/// Copy a header map without its connection-level headers.
pub fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "spellcache/0.1");
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "test/1.0".into(), timeout_ms: 1500, max_bytes: 1024, ..AppConfig::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "test/1.0");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.max_bytes, 1024);
    }

    #[test]
    fn test_forwardable_strips_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("close"));
        headers.insert("host", HeaderValue::from_static("localhost:8787"));
        headers.insert("apikey", HeaderValue::from_static("anon"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));

        let out = forwardable(&headers);
        assert!(out.get("connection").is_none());
        assert!(out.get("host").is_none());
        assert_eq!(out.get("apikey").unwrap(), "anon");
        assert_eq!(out.get("authorization").unwrap(), "Bearer t");
    }

    #[tokio::test]
    async fn test_http_upstream_new() {
        assert!(HttpUpstream::new(FetchConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_network_unavailable() {
        let config = FetchConfig { timeout: Duration::from_millis(500), ..FetchConfig::default() };
        let upstream = HttpUpstream::new(config).unwrap();
        let err = upstream.fetch(&HttpRequest::get("http://127.0.0.1:1/")).await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_network() {
        let upstream = HttpUpstream::new(FetchConfig::default()).unwrap();
        let err = upstream.fetch(&HttpRequest::get("ftp://example.com/file")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
