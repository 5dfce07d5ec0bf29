//! Versioned cache namespaces.
//!
//! A deployment owns exactly two namespaces, one per [`NamespaceKind`], both
//! scoped by the [`Generation`] derived from the deployment version token.
//! Every other namespace in the store is stale.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Cache generation, derived from an externally supplied version token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generation(String);

impl Generation {
    /// Build a generation from a deployment token.
    ///
    /// The token is trimmed and any character outside `[A-Za-z0-9._-]` is
    /// replaced by `_` so it can be embedded in a namespace name. When a
    /// replacement happened, the first 8 hex digits of the token's SHA-256
    /// are appended so distinct tokens keep distinct generations. An empty
    /// token becomes `default`.
    pub fn from_token(token: &str) -> Self {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Self("default".into());
        }
        let sanitized: String = trimmed
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
            .collect();
        if sanitized == trimmed {
            return Self(sanitized);
        }

        let digest = hex::encode(Sha256::digest(trimmed.as_bytes()));
        Self(format!("{sanitized}-{}", &digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a namespace holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceKind {
    /// Application shell and other static assets.
    Static,
    /// Remote data API responses.
    Api,
}

impl NamespaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Static => "static",
            NamespaceKind::Api => "api",
        }
    }
}

/// A named, versioned storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNamespace {
    pub name: String,
    pub kind: NamespaceKind,
    pub generation: Generation,
}

impl CacheNamespace {
    pub fn new(prefix: &str, kind: NamespaceKind, generation: Generation) -> Self {
        let name = format!("{prefix}-{}-{generation}", kind.as_str());
        Self { name, kind, generation }
    }
}

/// The current namespaces of one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    pub static_assets: CacheNamespace,
    pub api: CacheNamespace,
}

impl Namespaces {
    pub fn new(prefix: &str, generation: Generation) -> Self {
        Self {
            static_assets: CacheNamespace::new(prefix, NamespaceKind::Static, generation.clone()),
            api: CacheNamespace::new(prefix, NamespaceKind::Api, generation),
        }
    }

    /// Names that pruning must never delete.
    pub fn reserved(&self) -> [&str; 2] {
        [self.static_assets.name.as_str(), self.api.name.as_str()]
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved().contains(&name)
    }

    pub fn get(&self, kind: NamespaceKind) -> &CacheNamespace {
        match kind {
            NamespaceKind::Static => &self.static_assets,
            NamespaceKind::Api => &self.api,
        }
    }
}
