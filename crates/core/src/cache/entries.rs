//! Namespace and entry operations.
//!
//! Entries are stored per namespace and keyed by the request hash. Writes use
//! UPSERT semantics, so the last completed write for a key wins and an entry
//! is always replaced whole, never merged.

use super::connection::CacheDb;
use super::hash::RequestKey;
use crate::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// When this process stored the entry. Never taken from upstream headers.
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry stamped with the current local time.
    pub fn new(key: RequestKey, status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self { key, status, headers, body, fetched_at: Utc::now() }
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type EntryRow = (String, String, i64, String, Vec<u8>, String);

fn decode_row(row: EntryRow) -> Result<CacheEntry, Error> {
    let (method, url, status, headers_json, body, fetched_at) = row;
    let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;
    let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
        .map_err(|e| Error::CorruptEntry(format!("fetched_at '{fetched_at}': {e}")))?
        .with_timezone(&Utc);
    let status = u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("status {status}")))?;

    Ok(CacheEntry { key: RequestKey { method, url }, status, headers, body, fetched_at })
}

impl CacheDb {
    /// Create a namespace if it does not exist.
    ///
    /// Returns true when the namespace was newly created.
    pub async fn open_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                    params![name, created_at],
                )?;
                Ok(inserted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// All namespace names, sorted.
    pub async fn namespace_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM namespaces ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a namespace and, by cascade, all of its entries.
    ///
    /// Returns false if the namespace did not exist.
    pub async fn delete_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM namespaces WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace an entry.
    ///
    /// The namespace is created on demand so a write never fails just
    /// because install did not get to open it.
    pub async fn put_entry(&self, namespace: &str, entry: &CacheEntry) -> Result<(), Error> {
        let namespace = namespace.to_string();
        let key_hash = entry.key.hash();
        let method = entry.key.method.clone();
        let url = entry.key.url.clone();
        let status = i64::from(entry.status);
        let headers_json = serde_json::to_string(&entry.headers)?;
        let body = entry.body.clone();
        let fetched_at = entry.fetched_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let created_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                    params![namespace, created_at],
                )?;
                tx.execute(
                    "INSERT INTO entries (namespace, key_hash, method, url, status, headers_json, body, fetched_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(namespace, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        fetched_at = excluded.fetched_at",
                    params![namespace, key_hash, method, url, status, headers_json, body, fetched_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by request key.
    ///
    /// Returns None if the key (or the namespace) doesn't exist.
    pub async fn get_entry(&self, namespace: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        let namespace = namespace.to_string();
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, headers_json, body, fetched_at
                    FROM entries WHERE namespace = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![namespace, key_hash], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
                });

                match result {
                    Ok(row) => decode_row(row).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns false if it did not exist.
    pub async fn delete_entry(&self, namespace: &str, key: &RequestKey) -> Result<bool, Error> {
        let namespace = namespace.to_string();
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE namespace = ?1 AND key_hash = ?2",
                    params![namespace, key_hash],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Request keys of every entry in a namespace, ordered by URL.
    pub async fn entry_keys(&self, namespace: &str) -> Result<Vec<RequestKey>, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                let mut stmt =
                    conn.prepare("SELECT method, url FROM entries WHERE namespace = ?1 ORDER BY url, method")?;
                let keys = stmt
                    .query_map(params![namespace], |row| Ok(RequestKey { method: row.get(0)?, url: row.get(1)? }))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a namespace.
    pub async fn count_entries(&self, namespace: &str) -> Result<u64, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE namespace = ?1", params![namespace], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry of a namespace but keep the namespace.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_namespace(&self, namespace: &str) -> Result<u64, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE namespace = ?1", params![namespace])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
