//! Maintenance operations on the cache database the proxy uses.

use serde::Serialize;
use spellcache_core::{AppConfig, CacheDb, Classifier, Error, Namespaces};
use std::collections::BTreeSet;

#[derive(Debug, Serialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub entries: u64,
    /// Part of the current generation.
    pub current: bool,
}

#[derive(Debug, Serialize)]
pub struct CacheInfo {
    pub generation: String,
    pub namespaces: Vec<NamespaceInfo>,
    /// Distinct API resources with at least one cached entry in the current generation.
    pub resources: Vec<String>,
}

pub struct Maintenance {
    db: CacheDb,
    namespaces: Namespaces,
    classifier: Classifier,
}

impl Maintenance {
    pub fn new(db: CacheDb, config: &AppConfig) -> Self {
        Self { db, namespaces: config.namespaces(), classifier: Classifier::new(config.classifier()) }
    }

    pub async fn info(&self) -> Result<CacheInfo, Error> {
        let mut namespaces = Vec::new();
        for name in self.db.namespace_names().await? {
            let entries = self.db.count_entries(&name).await?;
            let current = self.namespaces.is_reserved(&name);
            namespaces.push(NamespaceInfo { name, entries, current });
        }

        let resources: BTreeSet<String> = self
            .db
            .entry_keys(&self.namespaces.api.name)
            .await?
            .iter()
            .filter_map(|key| self.classifier.classify(&key.url).resource_id)
            .collect();

        Ok(CacheInfo {
            generation: self.namespaces.api.generation.to_string(),
            namespaces,
            resources: resources.into_iter().collect(),
        })
    }

    /// Delete every entry of the current API namespace.
    pub async fn clear(&self) -> Result<u64, Error> {
        let removed = self.db.clear_namespace(&self.namespaces.api.name).await?;
        tracing::info!(namespace = %self.namespaces.api.name, removed, "cleared api cache");
        Ok(removed)
    }

    /// Delete the cached entries of one resource so the next access hits the network.
    pub async fn refresh(&self, resource: &str) -> Result<u64, Error> {
        let resource = resource.trim();
        if resource.is_empty() {
            return Err(Error::InvalidInput("resource name is empty".into()));
        }

        let namespace = &self.namespaces.api.name;
        let mut removed = 0;
        for key in self.db.entry_keys(namespace).await? {
            let matches = self.classifier.classify(&key.url).resource_id.as_deref() == Some(resource);
            if matches && self.db.delete_entry(namespace, &key).await? {
                removed += 1;
            }
        }

        tracing::info!(resource, removed, "refreshed resource");
        Ok(removed)
    }

    /// Delete every namespace outside the current generation.
    pub async fn prune(&self) -> Result<Vec<String>, Error> {
        let mut pruned = Vec::new();
        for name in self.db.namespace_names().await? {
            if !self.namespaces.is_reserved(&name) && self.db.delete_namespace(&name).await? {
                pruned.push(name);
            }
        }
        Ok(pruned)
    }
}
