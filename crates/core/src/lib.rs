//! Core types and shared functionality for spellcache.
//!
//! This crate provides:
//! - Cache store with SQLite backend
//! - Resource classification and caching policy
//! - Versioned cache namespaces
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod namespace;
pub mod policy;

pub use cache::{CacheDb, CacheEntry, CacheStore, RequestKey};
pub use classify::{Classification, Classifier, ClassifierConfig};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use namespace::{CacheNamespace, Generation, NamespaceKind, Namespaces};
pub use policy::{Category, Decision, PolicyTable, ResourcePolicy};
