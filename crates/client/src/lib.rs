//! Request interception for spellcache.
//!
//! This crate provides the upstream HTTP client, the fetch pipeline, the
//! lifecycle manager and the offline responder, tied together by
//! [`CacheService`] for the proxy binary.

pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod offline;
pub mod pipeline;
pub mod service;

#[cfg(test)]
mod testing;

pub use fetch::{FetchConfig, HttpUpstream, Upstream, canonicalize};
pub use http::{CACHE_STATUS_HEADER, CacheStatus, FETCHED_AT_HEADER, HttpRequest, HttpResponse, is_hop_by_hop};
pub use lifecycle::{ActivationReport, InstallReport, LifecycleConfig, LifecycleManager, LifecycleState};
pub use offline::OfflineResponder;
pub use pipeline::{FetchPipeline, Revalidator};
pub use service::CacheService;
