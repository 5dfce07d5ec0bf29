//! Binds hyper connections to the cache service.
//!
//! Absolute-form targets (`GET https://x.supabase.co/rest/v1/spells`) are used
//! as-is, so the proxy works as a forward proxy. Origin-form targets are
//! resolved against `api_base_url` when they fall under the API prefix and
//! against `static_origin` otherwise.

use crate::error::ProxyError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::{Request, Response, Uri};
use spellcache_client::fetch::forwardable;
use spellcache_client::{CacheService, HttpRequest, HttpResponse};
use spellcache_core::AppConfig;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::sync::Arc;

/// Maps request targets to absolute URLs.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    static_origin: String,
    api_base_url: Option<String>,
    api_prefix: String,
}

impl TargetResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            static_origin: config.static_origin.trim_end_matches('/').to_string(),
            api_base_url: config
                .api_base_url
                .as_ref()
                .map(|base| base.trim_end_matches('/').to_string()),
            api_prefix: config.api_prefix.clone(),
        }
    }

    pub fn resolve(&self, uri: &Uri) -> Result<String, ProxyError> {
        if uri.scheme().is_some() {
            return Ok(uri.to_string());
        }

        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or_default();
        if !path.starts_with('/') {
            return Err(ProxyError::InvalidTarget(format!("unsupported request target {path}")));
        }

        let base = match &self.api_base_url {
            Some(api) if path.starts_with(self.api_prefix.as_str()) => api,
            _ => &self.static_origin,
        };
        Ok(format!("{base}{path}"))
    }
}

/// Per-connection request handler.
#[derive(Clone)]
pub struct ProxyHandler {
    service: Arc<CacheService>,
    targets: TargetResolver,
    max_body: usize,
}

impl ProxyHandler {
    pub fn new(service: Arc<CacheService>, targets: TargetResolver, max_body: usize) -> Self {
        Self { service, targets, max_body }
    }

    pub async fn handle(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        let request = match self.to_request(req).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "rejected request");
                return Ok(e.into_response());
            }
        };

        let method = request.method.clone();
        let url = request.url.clone();
        let response = self.service.handle_fetch(request).await;
        tracing::info!(%method, %url, status = response.status.as_u16(), "served");

        Ok(into_hyper(response))
    }

    async fn to_request(&self, req: Request<Incoming>) -> Result<HttpRequest, ProxyError> {
        let (parts, body) = req.into_parts();
        let url = self.targets.resolve(&parts.uri)?;
        let body = read_body(body, self.max_body).await?;

        Ok(HttpRequest { method: parts.method, url, headers: forwardable(&parts.headers), body })
    }
}

/// Buffer a request body, refusing anything longer than `limit` bytes.
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, ProxyError>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(ProxyError::BodyTooLarge(limit)),
        Err(e) => Err(ProxyError::BodyRead(e.to_string())),
    }
}

/// Convert a pipeline response into a hyper response.
pub fn into_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = forwardable(&response.headers);
    out
}
