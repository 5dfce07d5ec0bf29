//! Host-neutral HTTP request and response values.
//!
//! The host adapter converts its own request type into [`HttpRequest`] and
//! writes back whatever [`HttpResponse`] the pipeline produced.

use bytes::Bytes;
use chrono::SecondsFormat;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use spellcache_core::{CacheEntry, RequestKey};

/// Response header naming where a response came from.
pub const CACHE_STATUS_HEADER: &str = "x-spellcache";

/// Response header carrying the local time a cached entry was stored.
pub const FETCHED_AT_HEADER: &str = "x-spellcache-fetched-at";

/// Headers that describe a single connection and must not be forwarded or stored.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Validators a client sends against its own copy. A response to a request
/// carrying one of these may be a bodiless 304 that cannot be stored.
const CONDITIONAL: &[&str] = &["if-none-match", "if-modified-since", "if-match", "if-unmodified-since", "if-range"];

/// True for connection-level headers (plus `host` and `content-length`,
/// which are recomputed for every hop).
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// How a cached response is being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Fresh entry.
    Hit,
    /// Expired entry, refresh scheduled.
    Stale,
    /// Entry served because the network failed.
    Fallback,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Stale => "stale",
            CacheStatus::Fallback => "fallback",
        }
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header, ignoring names or values that are not valid HTTP.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Copy of this request without conditional headers, so the upstream
    /// answers with a full body that can be cached.
    pub fn unconditional(&self) -> Self {
        let mut request = self.clone();
        for name in CONDITIONAL {
            request.headers.remove(*name);
        }
        request
    }

    /// A top-level page load rather than a subresource or data request.
    pub fn is_navigation(&self) -> bool {
        let mode = self
            .headers
            .get("sec-fetch-mode")
            .and_then(|v| v.to_str().ok());
        if let Some(mode) = mode {
            return mode.eq_ignore_ascii_case("navigate");
        }

        self.method == Method::GET
            && self
                .headers
                .get_all(header::ACCEPT)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .any(|accept| accept.contains("text/html"))
    }
}

/// A response produced by the pipeline.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into() }
    }

    /// JSON response. Serialization failures yield an empty body.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::new(status, headers, serde_json::to_vec(value).unwrap_or_default())
    }

    /// HTML response.
    pub fn html(status: StatusCode, body: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        Self::new(status, headers, Bytes::from_static(body.as_bytes()))
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Copy this response into a cache entry stamped with the current time.
    ///
    /// Connection-level headers and the cache's own annotations are dropped.
    pub fn to_entry(&self, key: RequestKey) -> CacheEntry {
        let headers = self
            .headers
            .iter()
            .filter(|(name, _)| {
                let name = name.as_str();
                !is_hop_by_hop(name) && name != CACHE_STATUS_HEADER && name != FETCHED_AT_HEADER
            })
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        CacheEntry::new(key, self.status.as_u16(), headers, self.body.to_vec())
    }

    /// Rebuild a response from a cache entry.
    ///
    /// The body is returned byte for byte; headers gain the cache annotations.
    pub fn from_entry(entry: CacheEntry, cache_status: CacheStatus) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &entry.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }
        headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status.as_str()));
        if let Ok(value) = HeaderValue::from_str(&entry.fetched_at.to_rfc3339_opts(SecondsFormat::Millis, true)) {
            headers.insert(FETCHED_AT_HEADER, value);
        }

        let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
        Self { status, headers, body: Bytes::from(entry.body) }
    }
}
