//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SPELLCACHE_*)
//! 2. TOML config file (if SPELLCACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! `AppConfig` is loaded once at startup and split into the narrower values
//! each component needs (`ClassifierConfig`, `PolicyTable`, `Namespaces`).

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::classify::ClassifierConfig;
use crate::namespace::{Generation, Namespaces};
use crate::policy::PolicyTable;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SPELLCACHE_*)
/// 2. TOML config file (if SPELLCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment version token. Seeds the cache generation; changing it
    /// invalidates every namespace on the next activation.
    ///
    /// Set via SPELLCACHE_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Prefix shared by every namespace this deployment owns.
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,

    /// Path to SQLite cache database.
    ///
    /// Set via SPELLCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address the proxy listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Origin serving the application shell and static assets.
    #[serde(default = "default_static_origin")]
    pub static_origin: String,

    /// Base URL of the remote data API, used to resolve origin-form requests
    /// under `api_prefix`. Absolute-form requests never need it.
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Hosts treated as the remote data API (subdomains included).
    #[serde(default = "default_api_hosts")]
    pub api_hosts: Vec<String>,

    /// Path prefix preceding the resource identifier.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Resources that rarely change.
    #[serde(default = "default_long_term")]
    pub long_term: Vec<String>,

    /// Resources that change during a session.
    #[serde(default = "default_short_term")]
    pub short_term: Vec<String>,

    /// Resources that must always be fresh. Unlisted resources behave the same.
    #[serde(default = "default_no_cache")]
    pub no_cache: Vec<String>,

    /// Freshness window for long-term resources, in seconds.
    #[serde(default = "default_long_term_ttl_secs")]
    pub long_term_ttl_secs: u64,

    /// Freshness window for short-term resources, in seconds.
    #[serde(default = "default_short_term_ttl_secs")]
    pub short_term_ttl_secs: u64,

    /// Root-relative paths pre-cached at install.
    #[serde(default = "default_static_manifest")]
    pub static_manifest: Vec<String>,

    /// Cached pages served to navigations when the network is down, tried in order.
    #[serde(default = "default_navigation_fallbacks")]
    pub navigation_fallbacks: Vec<String>,

    /// User-Agent string for upstream requests.
    ///
    /// Set via SPELLCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in milliseconds.
    ///
    /// Set via SPELLCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum upstream body size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Serve a cached GET copy when a mutating request to the same URL fails.
    ///
    /// Off by default: a failed write answered with read data can hide data loss.
    #[serde(default)]
    pub mutation_cache_fallback: bool,
}

fn default_version() -> String {
    "default".into()
}

fn default_namespace_prefix() -> String {
    "spellcache".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./spellcache.sqlite")
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_static_origin() -> String {
    "http://localhost:5173".into()
}

fn default_api_hosts() -> Vec<String> {
    vec!["supabase.co".into(), "supabase.io".into()]
}

fn default_api_prefix() -> String {
    "/rest/v1/".into()
}

fn default_long_term() -> Vec<String> {
    ["spells", "classes", "subclasses", "spellslots", "attributes", "class_resources"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_short_term() -> Vec<String> {
    vec!["characters".into(), "user_spells".into()]
}

fn default_no_cache() -> Vec<String> {
    vec!["auth".into(), "realtime".into()]
}

fn default_long_term_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_short_term_ttl_secs() -> u64 {
    3 * 60 * 60
}

fn default_static_manifest() -> Vec<String> {
    vec!["/".into(), "/index.html".into(), "/manifest.json".into()]
}

fn default_navigation_fallbacks() -> Vec<String> {
    vec!["/index.html".into(), "/".into()]
}

fn default_user_agent() -> String {
    "spellcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            namespace_prefix: default_namespace_prefix(),
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
            static_origin: default_static_origin(),
            api_base_url: None,
            api_hosts: default_api_hosts(),
            api_prefix: default_api_prefix(),
            long_term: default_long_term(),
            short_term: default_short_term(),
            no_cache: default_no_cache(),
            long_term_ttl_secs: default_long_term_ttl_secs(),
            short_term_ttl_secs: default_short_term_ttl_secs(),
            static_manifest: default_static_manifest(),
            navigation_fallbacks: default_navigation_fallbacks(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            mutation_cache_fallback: false,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SPELLCACHE_`
    /// 2. TOML file from `SPELLCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SPELLCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SPELLCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Cache generation derived from the deployment version token.
    pub fn generation(&self) -> Generation {
        Generation::from_token(&self.version)
    }

    /// The current namespaces for this deployment.
    pub fn namespaces(&self) -> Namespaces {
        Namespaces::new(&self.namespace_prefix, self.generation())
    }

    /// Classifier settings.
    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig { api_hosts: self.api_hosts.clone(), api_prefix: self.api_prefix.clone() }
    }

    /// Category membership table with TTLs.
    pub fn policy_table(&self) -> PolicyTable {
        PolicyTable::new(
            self.long_term.iter().cloned(),
            self.short_term.iter().cloned(),
            self.no_cache.iter().cloned(),
            Duration::from_secs(self.long_term_ttl_secs),
            Duration::from_secs(self.short_term_ttl_secs),
        )
    }
}
