//! Synthetic responses for requests that neither the network nor the cache can answer.

use crate::http::{CacheStatus, HttpResponse};
use reqwest::StatusCode;
use serde::Serialize;
use spellcache_core::CacheEntry;

/// Minimal page shown to navigations when no shell page is cached.
pub const OFFLINE_PAGE: &str =
    "<!DOCTYPE html><html><body><h1>Offline</h1><p>App is offline and page not cached.</p></body></html>";

const NOT_CACHED: &str = "Offline and not cached";
const NOT_DELIVERED: &str = "Offline: request not delivered";
const UPSTREAM_FAILED: &str = "Upstream request failed";

#[derive(Debug, Serialize)]
struct OfflineBody<'a> {
    error: &'static str,
    offline: bool,
    table: Option<&'a str>,
}

/// Builds the last-resort response once every other path has failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineResponder;

impl OfflineResponder {
    /// Serve the cached entry if there is one, otherwise a 503 JSON error naming the resource.
    pub fn respond(&self, resource_id: Option<&str>, cached: Option<CacheEntry>) -> HttpResponse {
        match cached {
            Some(entry) => HttpResponse::from_entry(entry, CacheStatus::Fallback),
            None => Self::unavailable(NOT_CACHED, resource_id),
        }
    }

    /// A write that could not reach the network.
    pub fn mutation_failed(&self, resource_id: Option<&str>) -> HttpResponse {
        Self::unavailable(NOT_DELIVERED, resource_id)
    }

    /// The network was reachable but the exchange could not be used, for
    /// example an oversized body or an unsupported URL. Answered with 502.
    pub fn upstream_failed(&self, resource_id: Option<&str>) -> HttpResponse {
        HttpResponse::json(
            StatusCode::BAD_GATEWAY,
            &OfflineBody { error: UPSTREAM_FAILED, offline: false, table: resource_id },
        )
    }

    /// Inline HTML page for navigations.
    pub fn offline_page(&self) -> HttpResponse {
        HttpResponse::html(StatusCode::SERVICE_UNAVAILABLE, OFFLINE_PAGE)
    }

    fn unavailable(error: &'static str, table: Option<&str>) -> HttpResponse {
        HttpResponse::json(StatusCode::SERVICE_UNAVAILABLE, &OfflineBody { error, offline: true, table })
    }
}
