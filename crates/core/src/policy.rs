//! Per-resource caching policy.
//!
//! The policy engine is synchronous and side-effect free: it looks up the
//! resource's category and compares a cached entry's age against the
//! category TTL. Executing the decision is the fetch pipeline's job.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Reference data that rarely changes.
    LongTerm,
    /// User data that changes during a session.
    ShortTerm,
    /// Must always come from the network. Default for unknown resources.
    NoCache,
}

/// Category plus its freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePolicy {
    pub category: Category,
    /// `None` for `NoCache`.
    pub ttl: Option<Duration>,
}

/// What the pipeline should do with one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Forward to the network; the cache is neither read nor written.
    ServeNetwork,
    /// Serve the cached entry now and refresh it in the background.
    ServeCacheThenRevalidate,
    /// Serve the cached entry; no network traffic.
    ServeCacheOnly,
    /// Network first; store a successful response.
    ServeNetworkWithCacheWrite,
}

/// Static membership table mapping resource ids to categories.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    long_term: HashSet<String>,
    short_term: HashSet<String>,
    no_cache: HashSet<String>,
    long_term_ttl: Duration,
    short_term_ttl: Duration,
}

impl PolicyTable {
    pub fn new(
        long_term: impl IntoIterator<Item = String>, short_term: impl IntoIterator<Item = String>,
        no_cache: impl IntoIterator<Item = String>, long_term_ttl: Duration, short_term_ttl: Duration,
    ) -> Self {
        Self {
            long_term: long_term.into_iter().collect(),
            short_term: short_term.into_iter().collect(),
            no_cache: no_cache.into_iter().collect(),
            long_term_ttl,
            short_term_ttl,
        }
    }

    /// Category for a resource. Unknown and missing resources are `NoCache`.
    pub fn category(&self, resource_id: Option<&str>) -> Category {
        let Some(id) = resource_id else {
            return Category::NoCache;
        };
        if self.no_cache.contains(id) {
            Category::NoCache
        } else if self.long_term.contains(id) {
            Category::LongTerm
        } else if self.short_term.contains(id) {
            Category::ShortTerm
        } else {
            Category::NoCache
        }
    }

    pub fn ttl(&self, category: Category) -> Option<Duration> {
        match category {
            Category::LongTerm => Some(self.long_term_ttl),
            Category::ShortTerm => Some(self.short_term_ttl),
            Category::NoCache => None,
        }
    }

    pub fn policy(&self, resource_id: Option<&str>) -> ResourcePolicy {
        let category = self.category(resource_id);
        ResourcePolicy { category, ttl: self.ttl(category) }
    }

    /// Decide how to serve a request.
    ///
    /// `cached_at` is the `fetched_at` of the cached entry, if one exists.
    /// An entry dated in the future counts as fresh.
    pub fn decide(
        &self, resource_id: Option<&str>, method: &str, cached_at: Option<DateTime<Utc>>, now: DateTime<Utc>,
    ) -> Decision {
        if !method.eq_ignore_ascii_case("GET") {
            return Decision::ServeNetwork;
        }

        let ResourcePolicy { category, ttl } = self.policy(resource_id);
        let Some(ttl) = ttl else {
            return Decision::ServeNetworkWithCacheWrite;
        };
        let Some(fetched_at) = cached_at else {
            return Decision::ServeNetworkWithCacheWrite;
        };

        // Negative ages (clock skew) map to zero.
        let age = (now - fetched_at).to_std().unwrap_or_default();
        tracing::trace!(?category, age_secs = age.as_secs(), ttl_secs = ttl.as_secs(), "policy lookup");

        if age <= ttl { Decision::ServeCacheOnly } else { Decision::ServeCacheThenRevalidate }
    }
}
