//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (WAYPOST_*)
//! 2. TOML config file (if WAYPOST_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! Route tables and the cache version are fixed for the life of an engine;
//! nothing here is editable at runtime.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::store::DEFAULT_MAX_ENTRY_BYTES;

mod validation;

pub use validation::ConfigError;

/// A single route matcher, as written in configuration.
///
/// ```toml
/// [[routes.bypass]]
/// kind = "extension"
/// value = "pdf"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RoutePattern {
    /// Path ends in `.<value>`, case-insensitive.
    Extension(String),
    /// Absolute URL contains the substring.
    UrlContains(String),
    /// Host contains the substring, case-insensitive.
    HostContains(String),
    /// Path contains the substring.
    PathContains(String),
    /// Absolute URL matches the regular expression.
    Regex(String),
}

/// The two disjoint route sets the classifier consults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// URLs that are never cached. Wins over `network_first`.
    #[serde(default = "default_bypass")]
    pub bypass: Vec<RoutePattern>,

    /// Application routes that always try the network first.
    #[serde(default = "default_network_first")]
    pub network_first: Vec<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self { bypass: default_bypass(), network_first: default_network_first() }
    }
}

fn default_bypass() -> Vec<RoutePattern> {
    vec![
        RoutePattern::Extension("pdf".into()),
        RoutePattern::Extension("mp3".into()),
        RoutePattern::Extension("mp4".into()),
        RoutePattern::Extension("webm".into()),
        RoutePattern::HostContains("supabase.co".into()),
        RoutePattern::PathContains("/api/".into()),
        RoutePattern::PathContains("/auth/".into()),
        RoutePattern::PathContains("/functions/".into()),
    ]
}

fn default_network_first() -> Vec<String> {
    [
        "/",
        "/app",
        "/admin",
        "/pricing",
        "/checkout",
        "/payment-success",
        "/payment-cancel",
        "/player",
        "/sw.js",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (WAYPOST_*)
/// 2. TOML config file (if WAYPOST_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the current cache generation.
    ///
    /// Set via WAYPOST_CACHE_VERSION. Defaults to `app-v<crate version>`.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// The application's own origin.
    ///
    /// Relative paths resolve against it and requests to other origins
    /// are cross-origin. Set via WAYPOST_ORIGIN.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to SQLite cache database.
    ///
    /// Set via WAYPOST_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests that carry none.
    ///
    /// Set via WAYPOST_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds. Unset leaves the transport default.
    ///
    /// Set via WAYPOST_TIMEOUT_MS environment variable.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Largest response body that will be stored.
    ///
    /// Set via WAYPOST_MAX_ENTRY_BYTES environment variable.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,

    /// Critical static assets fetched and stored on install.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Request headers that participate in request identity.
    #[serde(default)]
    pub vary_headers: Vec<String>,

    /// Path prefix of the engine's own control surface; never intercepted.
    #[serde(default = "default_control_path")]
    pub control_path: String,

    /// User-agent substrings for which PDF requests are not intercepted at all.
    #[serde(default = "default_pdf_passthrough_agents")]
    pub pdf_passthrough_agents: Vec<String>,

    /// Bypass patterns and network-first paths.
    #[serde(default)]
    pub routes: RouteConfig,
}

fn default_cache_version() -> String {
    format!("app-v{}", env!("CARGO_PKG_VERSION"))
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./waypost-cache.sqlite")
}

fn default_user_agent() -> String {
    "waypost/0.1".into()
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_entry_bytes() -> usize {
    DEFAULT_MAX_ENTRY_BYTES
}

fn default_precache() -> Vec<String> {
    ["/", "/index.html", "/manifest.json", "/favicon.ico"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_control_path() -> String {
    "/__waypost".into()
}

fn default_pdf_passthrough_agents() -> Vec<String> {
    ["iPhone", "iPad", "iPod"].into_iter().map(String::from).collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_version: default_cache_version(),
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: None,
            max_redirects: default_max_redirects(),
            max_entry_bytes: default_max_entry_bytes(),
            precache: default_precache(),
            vary_headers: Vec::new(),
            control_path: default_control_path(),
            pdf_passthrough_agents: default_pdf_passthrough_agents(),
            routes: RouteConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `WAYPOST_`
    /// 2. TOML file from `WAYPOST_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("WAYPOST_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("WAYPOST_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
