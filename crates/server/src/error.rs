//! Structured errors for the proxy's own failures.
//!
//! Everything the cache can answer goes through `CacheService`; these cover
//! requests the adapter cannot even hand over.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};

/// Structured errors for the proxy adapter.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The request target cannot be turned into an absolute URL.
    #[error("INVALID_TARGET: {0}")]
    InvalidTarget(String),

    /// The request body could not be read.
    #[error("BODY_READ_FAILED: {0}")]
    BodyRead(String),

    /// The request body exceeds `max_bytes`.
    #[error("BODY_TOO_LARGE: request body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget(_) | ProxyError::BodyRead(_) => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// JSON error response `{"error": "<CODE>: <detail>"}`.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let body = serde_json::json!({ "error": self.to_string() });
        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = self.status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let response = ProxyError::InvalidTarget("no host".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_body_too_large_is_413() {
        let response = ProxyError::BodyTooLarge(1024).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_error_display_has_code() {
        assert!(ProxyError::BodyRead("reset".into()).to_string().starts_with("BODY_READ_FAILED"));
    }
}
