//! SQLite-backed response cache.
//!
//! This module provides a persistent, namespaced cache using SQLite with
//! async access via tokio-rusqlite. It supports:
//!
//! - Request identity hashing (method + canonical URL, SHA-256)
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Namespace deletion cascading to entries

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
pub use hash::RequestKey;
pub use store::CacheStore;
