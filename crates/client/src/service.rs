//! Host-facing entry points: install, activate, fetch.

use crate::fetch::Upstream;
use crate::http::{HttpRequest, HttpResponse};
use crate::lifecycle::{ActivationReport, InstallReport, LifecycleConfig, LifecycleManager, LifecycleState};
use crate::pipeline::{FetchPipeline, Revalidator};
use spellcache_core::{AppConfig, CacheStore, Error, Namespaces};
use std::sync::Arc;
use tokio::sync::watch;

/// One deployed cache generation.
///
/// `handle_fetch` waits until activation has finished so no request is
/// served before old generations are pruned.
pub struct CacheService {
    lifecycle: LifecycleManager,
    pipeline: FetchPipeline,
    ready: watch::Receiver<LifecycleState>,
}

impl CacheService {
    pub fn new(config: &AppConfig, store: Arc<dyn CacheStore>, upstream: Arc<dyn Upstream>) -> Result<Self, Error> {
        let lifecycle = LifecycleManager::new(
            config.namespaces(),
            store.clone(),
            upstream.clone(),
            LifecycleConfig::from_app(config)?,
        );
        let pipeline = FetchPipeline::new(config, store, upstream)?;
        let ready = lifecycle.subscribe();

        Ok(Self { lifecycle, pipeline, ready })
    }

    pub async fn on_install(&self) -> Result<InstallReport, Error> {
        self.lifecycle.on_install().await
    }

    pub async fn on_activate(&self) -> Result<ActivationReport, Error> {
        self.lifecycle.on_activate().await
    }

    /// Answer one intercepted request. Never fails.
    pub async fn handle_fetch(&self, request: HttpRequest) -> HttpResponse {
        let mut ready = self.ready.clone();
        if let Err(e) = ready.wait_for(LifecycleState::is_active).await {
            tracing::warn!(error = %e, "lifecycle channel closed before activation");
        }
        self.pipeline.handle(request).await
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn namespaces(&self) -> &Namespaces {
        self.pipeline.namespaces()
    }

    pub fn revalidator(&self) -> &Revalidator {
        self.pipeline.revalidator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::CACHE_STATUS_HEADER;
    use crate::testing::{API, ORIGIN, ScriptedUpstream, body_json};
    use reqwest::StatusCode;
    use spellcache_core::CacheDb;
    use std::time::Duration;

    async fn service(db: &CacheDb, upstream: Arc<ScriptedUpstream>, version: &str) -> Arc<CacheService> {
        let config = AppConfig { version: version.into(), ..AppConfig::default() };
        Arc::new(CacheService::new(&config, Arc::new(db.clone()), upstream).unwrap())
    }

    #[tokio::test]
    async fn test_fetch_waits_for_activation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let service = service(&db, ScriptedUpstream::new(), "v1").await;

        let pending = {
            let service = service.clone();
            tokio::spawn(async move { service.handle_fetch(HttpRequest::get(format!("{API}/spells"))).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        service.on_install().await.unwrap();
        service.on_activate().await.unwrap();

        let response = tokio::time::timeout(Duration::from_secs(2), pending).await.unwrap().unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_offline_shell_after_install() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let upstream = ScriptedUpstream::new();
        let service = service(&db, upstream.clone(), "v1").await;
        service.on_install().await.unwrap();
        service.on_activate().await.unwrap();

        upstream.set_online(false);
        let request = HttpRequest::get(format!("{ORIGIN}/spellbook")).with_header("Sec-Fetch-Mode", "navigate");
        let response = service.handle_fetch(request).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header(CACHE_STATUS_HEADER), Some("fallback"));
        assert_eq!(body_json(&response)["url"], format!("{ORIGIN}/index.html"));
    }

    #[tokio::test]
    async fn test_new_version_repopulates_and_drops_old_data() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let upstream = ScriptedUpstream::new();

        let v1 = service(&db, upstream.clone(), "v1").await;
        v1.on_install().await.unwrap();
        v1.on_activate().await.unwrap();
        v1.handle_fetch(HttpRequest::get(format!("{API}/spells"))).await;
        assert_eq!(db.count_entries(&v1.namespaces().api.name).await.unwrap(), 1);

        let v2 = service(&db, upstream.clone(), "v2").await;
        v2.on_install().await.unwrap();
        let report = v2.on_activate().await.unwrap();
        assert_eq!(report.pruned.len(), 2);

        let before = upstream.calls();
        let response = v2.handle_fetch(HttpRequest::get(format!("{API}/spells"))).await;
        assert_eq!(upstream.calls(), before + 1);
        assert!(response.header(CACHE_STATUS_HEADER).is_none());
        assert_eq!(db.count_entries(&v2.namespaces().static_assets.name).await.unwrap(), 3);
    }
}
