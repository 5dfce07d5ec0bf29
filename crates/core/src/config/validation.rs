//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `version`, `namespace_prefix` or `user_agent` is empty
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` is 0 or exceeds 100MB
    /// - a TTL is zero, or the long-term TTL is shorter than the short-term TTL
    /// - `api_prefix` does not start and end with `/`
    /// - a manifest or fallback path is not root-relative
    /// - `static_origin` or `api_base_url` is not an http(s) URL
    /// - a resource appears in more than one category
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(invalid("version", "must not be empty"));
        }
        if self.namespace_prefix.is_empty() {
            return Err(invalid("namespace_prefix", "must not be empty"));
        }
        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 100 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 100MB"));
        }

        if self.long_term_ttl_secs == 0 {
            return Err(invalid("long_term_ttl_secs", "must be greater than 0"));
        }
        if self.short_term_ttl_secs == 0 {
            return Err(invalid("short_term_ttl_secs", "must be greater than 0"));
        }
        if self.long_term_ttl_secs < self.short_term_ttl_secs {
            return Err(invalid("long_term_ttl_secs", "must not be shorter than short_term_ttl_secs"));
        }

        if !self.api_prefix.starts_with('/') || !self.api_prefix.ends_with('/') || self.api_prefix.len() < 2 {
            return Err(invalid("api_prefix", "must start and end with '/'"));
        }
        if self.api_hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(invalid("api_hosts", "must not contain empty hosts"));
        }

        for path in self.static_manifest.iter().chain(&self.navigation_fallbacks) {
            if !path.starts_with('/') {
                return Err(invalid("static_manifest", format!("path '{path}' must be root-relative")));
            }
        }

        check_http_url("static_origin", &self.static_origin)?;
        if let Some(base) = &self.api_base_url {
            check_http_url("api_base_url", base)?;
        }

        let mut seen = HashSet::new();
        for resource in self.long_term.iter().chain(&self.short_term).chain(&self.no_cache) {
            if !seen.insert(resource.as_str()) {
                return Err(invalid("long_term", format!("resource '{resource}' is listed in more than one category")));
            }
        }

        if self.mutation_cache_fallback {
            tracing::warn!("mutation_cache_fallback is enabled; failed writes may be answered with cached reads");
        }

        Ok(())
    }
}

fn check_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| invalid(field, e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(field, format!("unsupported scheme: {scheme}"))),
    }
}
