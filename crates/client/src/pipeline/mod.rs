//! Per-request routing between the cache, the network and the offline responder.
//!
//! ### Static assets
//! Cache first, network on miss. A failed navigation falls back to a cached
//! shell page (`/index.html`, then `/`), then to the inline offline page.
//!
//! ### Remote API
//! The policy engine picks one of four decisions which are executed against
//! the API namespace. Network-first paths re-read the cache after a failure
//! before handing the request to the offline responder.
//!
//! Store failures never fail a request: reads become misses and writes are
//! skipped, both logged at `warn`.

pub mod revalidate;

use crate::fetch::{Upstream, canonicalize, resolve};
use crate::http::{CacheStatus, HttpRequest, HttpResponse};
use crate::offline::OfflineResponder;
use chrono::Utc;
use reqwest::Method;
use spellcache_core::{
    AppConfig, CacheEntry, CacheStore, Category, Classifier, Decision, Error, Namespaces, PolicyTable, RequestKey,
};
use std::sync::Arc;
use url::Url;

pub use revalidate::Revalidator;

/// Per-request facts gathered at interception. Never persisted.
#[derive(Debug, Clone)]
struct RequestContext {
    method: Method,
    url: String,
    resource_id: Option<String>,
    category: Category,
}

/// Intercepts every request and always produces a response.
pub struct FetchPipeline {
    classifier: Classifier,
    policy: PolicyTable,
    namespaces: Namespaces,
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn Upstream>,
    offline: OfflineResponder,
    revalidator: Revalidator,
    static_origin: Url,
    navigation_fallbacks: Vec<String>,
    mutation_cache_fallback: bool,
}

impl FetchPipeline {
    pub fn new(config: &AppConfig, store: Arc<dyn CacheStore>, upstream: Arc<dyn Upstream>) -> Result<Self, Error> {
        let static_origin = canonicalize(&config.static_origin)?;

        Ok(Self {
            classifier: Classifier::new(config.classifier()),
            policy: config.policy_table(),
            namespaces: config.namespaces(),
            store,
            upstream,
            offline: OfflineResponder,
            revalidator: Revalidator::new(),
            static_origin,
            navigation_fallbacks: config.navigation_fallbacks.clone(),
            mutation_cache_fallback: config.mutation_cache_fallback,
        })
    }

    pub fn revalidator(&self) -> &Revalidator {
        &self.revalidator
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Produce a response for one intercepted request. Never fails.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let url = match canonicalize(&request.url) {
            Ok(url) => url.to_string(),
            Err(_) => request.url.clone(),
        };

        let classification = self.classifier.classify(&url);
        if !classification.is_remote_api {
            return self.handle_static(&request, &url).await;
        }

        let category = self.policy.category(classification.resource_id.as_deref());
        let ctx = RequestContext {
            method: request.method.clone(),
            url,
            resource_id: classification.resource_id,
            category,
        };
        self.handle_api(&request, &ctx).await
    }

    async fn handle_static(&self, request: &HttpRequest, url: &str) -> HttpResponse {
        let namespace = self.namespaces.static_assets.name.as_str();

        if request.method != Method::GET {
            return match self.upstream.fetch(request).await {
                Ok(response) => response,
                Err(e) if !e.is_network_failure() => {
                    tracing::warn!(method = %request.method, %url, error = %e, "static request rejected");
                    self.offline.upstream_failed(None)
                }
                Err(e) => {
                    tracing::warn!(method = %request.method, %url, error = %e, "static request failed");
                    self.offline.respond(None, None)
                }
            };
        }

        let key = RequestKey::get(url);
        if let Some(entry) = self.lookup(namespace, &key).await {
            tracing::debug!(%url, "static cache hit");
            return HttpResponse::from_entry(entry, CacheStatus::Hit);
        }

        match self.upstream.fetch(&request.unconditional()).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(namespace, key, &response).await;
                }
                response
            }
            Err(e) if !e.is_network_failure() => {
                tracing::warn!(%url, error = %e, "static fetch rejected");
                self.offline.upstream_failed(None)
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "static fetch failed");
                if request.is_navigation() {
                    return self.navigation_fallback().await;
                }
                self.offline.respond(None, None)
            }
        }
    }

    async fn navigation_fallback(&self) -> HttpResponse {
        let namespace = self.namespaces.static_assets.name.as_str();
        for path in &self.navigation_fallbacks {
            let Ok(url) = resolve(&self.static_origin, path) else {
                continue;
            };
            if let Some(entry) = self.lookup(namespace, &RequestKey::get(url.as_str())).await {
                tracing::debug!(fallback = %url, "serving cached shell page");
                return HttpResponse::from_entry(entry, CacheStatus::Fallback);
            }
        }
        self.offline.offline_page()
    }

    async fn handle_api(&self, request: &HttpRequest, ctx: &RequestContext) -> HttpResponse {
        let namespace = self.namespaces.api.name.as_str();
        let key = RequestKey::get(ctx.url.as_str());
        let is_get = ctx.method == Method::GET;

        let cached = if is_get && ctx.category != Category::NoCache {
            self.lookup(namespace, &key).await
        } else {
            None
        };

        let decision = self.policy.decide(
            ctx.resource_id.as_deref(),
            ctx.method.as_str(),
            cached.as_ref().map(|entry| entry.fetched_at),
            Utc::now(),
        );
        tracing::debug!(method = %ctx.method, url = %ctx.url, resource = ?ctx.resource_id, ?decision, "api request");

        match (decision, cached) {
            (Decision::ServeCacheOnly, Some(entry)) => HttpResponse::from_entry(entry, CacheStatus::Hit),
            (Decision::ServeCacheThenRevalidate, Some(entry)) => {
                self.schedule_revalidation(request, key);
                HttpResponse::from_entry(entry, CacheStatus::Stale)
            }
            (Decision::ServeNetwork, _) => self.forward(request, ctx, &key).await,
            _ => self.network_first(request, ctx, key).await,
        }
    }

    /// Network first; successful GETs are stored, failures fall back to the cache.
    ///
    /// Validators are stripped so a stored copy is always a full 2xx body.
    async fn network_first(&self, request: &HttpRequest, ctx: &RequestContext, key: RequestKey) -> HttpResponse {
        let namespace = self.namespaces.api.name.as_str();

        match self.upstream.fetch(&request.unconditional()).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(namespace, key, &response).await;
                }
                response
            }
            Err(e) if !e.is_network_failure() => {
                tracing::warn!(url = %ctx.url, resource = ?ctx.resource_id, error = %e, "api fetch rejected");
                self.offline.upstream_failed(ctx.resource_id.as_deref())
            }
            Err(e) => {
                tracing::warn!(url = %ctx.url, resource = ?ctx.resource_id, error = %e, "api fetch failed");
                let cached = self.lookup(namespace, &key).await;
                self.offline.respond(ctx.resource_id.as_deref(), cached)
            }
        }
    }

    /// Mutations and other non-GET requests. The cache is not consulted unless
    /// `mutation_cache_fallback` is set.
    async fn forward(&self, request: &HttpRequest, ctx: &RequestContext, key: &RequestKey) -> HttpResponse {
        match self.upstream.fetch(request).await {
            Ok(response) => response,
            Err(e) if !e.is_network_failure() => {
                tracing::warn!(method = %ctx.method, url = %ctx.url, error = %e, "request rejected");
                self.offline.upstream_failed(ctx.resource_id.as_deref())
            }
            Err(e) => {
                tracing::warn!(method = %ctx.method, url = %ctx.url, error = %e, "request not delivered");
                if self.mutation_cache_fallback
                    && let Some(entry) = self.lookup(self.namespaces.api.name.as_str(), key).await
                {
                    return HttpResponse::from_entry(entry, CacheStatus::Fallback);
                }
                self.offline.mutation_failed(ctx.resource_id.as_deref())
            }
        }
    }

    fn schedule_revalidation(&self, request: &HttpRequest, key: RequestKey) {
        let request = request.unconditional();
        let store = self.store.clone();
        let upstream = self.upstream.clone();
        let namespace = self.namespaces.api.name.clone();

        self.revalidator.spawn(key.url.clone(), async move {
            let response = upstream.fetch(&request).await?;
            if !response.is_success() {
                return Err(Error::HttpError(format!("status {}", response.status.as_u16())));
            }
            store.put(&namespace, &response.to_entry(key)).await
        });
    }

    async fn lookup(&self, namespace: &str, key: &RequestKey) -> Option<CacheEntry> {
        match self.store.lookup(namespace, key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(namespace, url = %key.url, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, namespace: &str, key: RequestKey, response: &HttpResponse) {
        if let Err(e) = self.store.put(namespace, &response.to_entry(key)).await {
            tracing::warn!(namespace, error = %e, "cache write skipped");
        }
    }
}
