//! Storage seam used by the fetch pipeline and lifecycle manager.
//!
//! `CacheDb` is the production implementation. The trait exists so callers
//! hold `Arc<dyn CacheStore>` and tests can inject failing stores.

use async_trait::async_trait;

use super::connection::CacheDb;
use super::entries::CacheEntry;
use super::hash::RequestKey;
use crate::Error;

/// Async namespaced key/response store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the namespace if missing. Idempotent.
    async fn open(&self, namespace: &str) -> Result<(), Error>;

    /// Names of every existing namespace.
    async fn names(&self) -> Result<Vec<String>, Error>;

    /// Delete a namespace with all of its entries. Returns false if absent.
    async fn remove(&self, namespace: &str) -> Result<bool, Error>;

    /// Look up the entry stored for a request.
    async fn lookup(&self, namespace: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error>;

    /// Store an entry, replacing any previous one for the same key.
    async fn put(&self, namespace: &str, entry: &CacheEntry) -> Result<(), Error>;

    /// Delete one entry. Returns false if absent.
    async fn delete(&self, namespace: &str, key: &RequestKey) -> Result<bool, Error>;

    /// Keys of every entry in a namespace.
    async fn keys(&self, namespace: &str) -> Result<Vec<RequestKey>, Error>;
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn open(&self, namespace: &str) -> Result<(), Error> {
        self.open_namespace(namespace).await.map(|_| ())
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        self.namespace_names().await
    }

    async fn remove(&self, namespace: &str) -> Result<bool, Error> {
        self.delete_namespace(namespace).await
    }

    async fn lookup(&self, namespace: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        self.get_entry(namespace, key).await
    }

    async fn put(&self, namespace: &str, entry: &CacheEntry) -> Result<(), Error> {
        self.put_entry(namespace, entry).await
    }

    async fn delete(&self, namespace: &str, key: &RequestKey) -> Result<bool, Error> {
        self.delete_entry(namespace, key).await
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<RequestKey>, Error> {
        self.entry_keys(namespace).await
    }
}
