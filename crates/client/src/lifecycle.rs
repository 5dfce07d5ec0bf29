//! Install and activation of a cache generation.
//!
//! An instance moves `New -> Installing -> Installed -> Activating -> Active`
//! exactly once. A new deployment builds a new instance with a new
//! generation instead of rewinding an old one.

use crate::fetch::{Upstream, resolve};
use crate::http::HttpRequest;
use futures_util::future::join_all;
use serde::Serialize;
use spellcache_core::{AppConfig, CacheStore, Error, Namespaces, RequestKey};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

/// Lifecycle position of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    New,
    Installing,
    Installed,
    Activating,
    Active,
}

impl LifecycleState {
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::New => "NEW",
            LifecycleState::Installing => "INSTALLING",
            LifecycleState::Installed => "INSTALLED",
            LifecycleState::Activating => "ACTIVATING",
            LifecycleState::Active => "ACTIVE",
        };
        f.write_str(name)
    }
}

/// What the lifecycle manager needs beyond the namespaces.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub static_origin: Url,
    /// Root-relative paths pre-cached at install.
    pub manifest: Vec<String>,
}

impl LifecycleConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let static_origin = crate::fetch::canonicalize(&config.static_origin)?;
        Ok(Self { static_origin, manifest: config.static_manifest.clone() })
    }
}

/// Outcome of `on_install`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// URLs stored in the static namespace.
    pub cached: Vec<String>,
    /// Manifest paths that could not be fetched or stored.
    pub failed: Vec<String>,
}

/// Outcome of `on_activate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Namespaces deleted because they belong to another generation.
    pub pruned: Vec<String>,
}

pub struct LifecycleManager {
    namespaces: Namespaces,
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn Upstream>,
    config: LifecycleConfig,
    state: watch::Sender<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(
        namespaces: Namespaces, store: Arc<dyn CacheStore>, upstream: Arc<dyn Upstream>, config: LifecycleConfig,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::New);
        Self { namespaces, store, upstream, config, state }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Open the current namespaces and pre-cache the static manifest.
    ///
    /// Individual manifest failures are logged and reported, never propagated.
    pub async fn on_install(&self) -> Result<InstallReport, Error> {
        self.transition(LifecycleState::New, LifecycleState::Installing)?;

        for namespace in self.namespaces.reserved() {
            if let Err(e) = self.store.open(namespace).await {
                tracing::warn!(namespace, error = %e, "failed to open namespace");
            }
        }

        let outcomes = join_all(self.config.manifest.iter().map(|path| self.precache(path))).await;

        let mut report = InstallReport::default();
        for (path, outcome) in self.config.manifest.iter().zip(outcomes) {
            match outcome {
                Ok(url) => report.cached.push(url),
                Err(e) => {
                    tracing::error!(path, error = %e, "failed to pre-cache asset");
                    report.failed.push(path.clone());
                }
            }
        }

        self.state.send_replace(LifecycleState::Installed);
        tracing::info!(
            generation = %self.namespaces.static_assets.generation,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "installed"
        );
        Ok(report)
    }

    /// Delete every namespace not owned by this generation, then start serving.
    pub async fn on_activate(&self) -> Result<ActivationReport, Error> {
        self.transition(LifecycleState::Installed, LifecycleState::Activating)?;

        let names = match self.store.names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list namespaces, nothing pruned");
                Vec::new()
            }
        };

        let mut report = ActivationReport::default();
        for name in names.into_iter().filter(|name| !self.namespaces.is_reserved(name)) {
            match self.store.remove(&name).await {
                Ok(true) => {
                    tracing::info!(namespace = %name, "pruned namespace");
                    report.pruned.push(name);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(namespace = %name, error = %e, "failed to prune namespace"),
            }
        }

        self.state.send_replace(LifecycleState::Active);
        tracing::info!(pruned = report.pruned.len(), "active");
        Ok(report)
    }

    async fn precache(&self, path: &str) -> Result<String, Error> {
        let url = resolve(&self.config.static_origin, path)?;
        let response = self.upstream.fetch(&HttpRequest::get(url.as_str())).await?;
        if !response.is_success() {
            return Err(Error::HttpError(format!("status {}", response.status.as_u16())));
        }

        let entry = response.to_entry(RequestKey::get(url.as_str()));
        self.store.put(&self.namespaces.static_assets.name, &entry).await?;
        Ok(url.to_string())
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), Error> {
        let mut rejected = None;
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                rejected = Some(*state);
                false
            }
        });

        match rejected {
            Some(current) => Err(Error::Lifecycle(format!("cannot enter {to} from {current}"))),
            None => {
                tracing::debug!(%from, %to, "lifecycle transition");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BrokenStore, ORIGIN, ScriptedUpstream};
    use reqwest::StatusCode;
    use spellcache_core::{CacheDb, Generation};

    fn manager(db: &CacheDb, upstream: Arc<ScriptedUpstream>, version: &str) -> LifecycleManager {
        let config = AppConfig { version: version.into(), ..AppConfig::default() };
        LifecycleManager::new(
            config.namespaces(),
            Arc::new(db.clone()),
            upstream,
            LifecycleConfig::from_app(&config).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_install_precaches_manifest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let upstream = ScriptedUpstream::new();
        let lifecycle = manager(&db, upstream.clone(), "v1");

        let report = lifecycle.on_install().await.unwrap();
        assert_eq!(report.cached.len(), 3);
        assert!(report.failed.is_empty());
        assert_eq!(lifecycle.state(), LifecycleState::Installed);

        let namespaces = Namespaces::new("spellcache", Generation::from_token("v1"));
        assert_eq!(db.count_entries(&namespaces.static_assets.name).await.unwrap(), 3);
        assert!(
            db.get_entry(&namespaces.static_assets.name, &RequestKey::get(format!("{ORIGIN}/index.html")))
                .await
                .unwrap()
                .is_some()
        );

        let mut names = db.namespace_names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["spellcache-api-v1".to_string(), "spellcache-static-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_manifest_failure_does_not_abort_install() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let upstream = ScriptedUpstream::new();
        upstream.respond_status(&format!("{ORIGIN}/manifest.json"), StatusCode::NOT_FOUND);
        let lifecycle = manager(&db, upstream, "v1");

        let report = lifecycle.on_install().await.unwrap();
        assert_eq!(report.cached.len(), 2);
        assert_eq!(report.failed, vec!["/manifest.json".to_string()]);
        assert_eq!(lifecycle.state(), LifecycleState::Installed);
    }

    #[tokio::test]
    async fn test_install_offline_still_completes() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let upstream = ScriptedUpstream::new();
        upstream.set_online(false);
        let lifecycle = manager(&db, upstream, "v1");

        let report = lifecycle.on_install().await.unwrap();
        assert!(report.cached.is_empty());
        assert_eq!(report.failed.len(), 3);
        assert_eq!(lifecycle.state(), LifecycleState::Installed);
    }

    #[tokio::test]
    async fn test_activation_prunes_old_generations_only() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let upstream = ScriptedUpstream::new();

        let old = manager(&db, upstream.clone(), "v1");
        old.on_install().await.unwrap();
        old.on_activate().await.unwrap();
        db.open_namespace("legacy-cache").await.unwrap();

        let new = manager(&db, upstream, "v2");
        let install = new.on_install().await.unwrap();
        assert_eq!(install.cached.len(), 3);

        let mut report = new.on_activate().await.unwrap();
        report.pruned.sort();
        assert_eq!(
            report.pruned,
            vec!["legacy-cache".to_string(), "spellcache-api-v1".to_string(), "spellcache-static-v1".to_string()]
        );
        assert_eq!(new.state(), LifecycleState::Active);

        let mut names = db.namespace_names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["spellcache-api-v2".to_string(), "spellcache-static-v2".to_string()]);
        assert_eq!(db.count_entries("spellcache-static-v2").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_activation_is_idempotent_for_current_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let lifecycle = manager(&db, ScriptedUpstream::new(), "v1");
        lifecycle.on_install().await.unwrap();

        let report = lifecycle.on_activate().await.unwrap();
        assert!(report.pruned.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_hooks_rejected() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let lifecycle = manager(&db, ScriptedUpstream::new(), "v1");

        let err = lifecycle.on_activate().await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle(_)));
        assert_eq!(lifecycle.state(), LifecycleState::New);

        lifecycle.on_install().await.unwrap();
        assert!(matches!(lifecycle.on_install().await, Err(Error::Lifecycle(_))));

        lifecycle.on_activate().await.unwrap();
        assert!(matches!(lifecycle.on_activate().await, Err(Error::Lifecycle(_))));
        assert_eq!(lifecycle.state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_broken_store_still_reaches_active() {
        let config = AppConfig::default();
        let lifecycle = LifecycleManager::new(
            config.namespaces(),
            Arc::new(BrokenStore),
            ScriptedUpstream::new(),
            LifecycleConfig::from_app(&config).unwrap(),
        );

        let install = lifecycle.on_install().await.unwrap();
        assert_eq!(install.failed.len(), 3);
        let activate = lifecycle.on_activate().await.unwrap();
        assert!(activate.pruned.is_empty());
        assert!(lifecycle.state().is_active());
    }

    #[tokio::test]
    async fn test_subscribers_observe_active() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let lifecycle = manager(&db, ScriptedUpstream::new(), "v1");
        let mut rx = lifecycle.subscribe();

        lifecycle.on_install().await.unwrap();
        lifecycle.on_activate().await.unwrap();
        let state = *rx.wait_for(LifecycleState::is_active).await.unwrap();
        assert_eq!(state, LifecycleState::Active);
    }
}
