//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, RoutePattern};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `cache_version` is empty, and
    /// `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `timeout_ms` is set below 100ms or above 5 minutes
    /// - `max_entry_bytes` is 0 or exceeds 100MB
    /// - `user_agent` is empty
    /// - a network-first path, pre-cache entry or the control path is not rooted
    /// - a route pattern value is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_version.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "cache_version".into(),
                hint: "Set WAYPOST_CACHE_VERSION environment variable".into(),
            });
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host_str().is_some() => {}
            Ok(_) => return Err(invalid("origin", "must be an http(s) URL with a host")),
            Err(e) => return Err(invalid("origin", e.to_string())),
        }

        if let Some(timeout_ms) = self.timeout_ms {
            if timeout_ms < 100 {
                return Err(invalid("timeout_ms", "must be at least 100ms"));
            }
            if timeout_ms > 300_000 {
                return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
            }
        }

        if self.max_entry_bytes == 0 {
            return Err(invalid("max_entry_bytes", "must be greater than 0"));
        }
        if self.max_entry_bytes > 100 * 1024 * 1024 {
            return Err(invalid("max_entry_bytes", "must not exceed 100MB"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if !self.control_path.starts_with('/') {
            return Err(invalid("control_path", "must start with '/'"));
        }

        if let Some(path) = self.routes.network_first.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("routes.network_first", format!("'{path}' must start with '/'")));
        }

        if let Some(entry) = self
            .precache
            .iter()
            .find(|p| !p.starts_with('/') && url::Url::parse(p).is_err())
        {
            return Err(invalid("precache", format!("'{entry}' is neither a rooted path nor an absolute URL")));
        }

        for pattern in &self.routes.bypass {
            let value = match pattern {
                RoutePattern::Extension(v)
                | RoutePattern::UrlContains(v)
                | RoutePattern::HostContains(v)
                | RoutePattern::PathContains(v)
                | RoutePattern::Regex(v) => v,
            };
            if value.trim().is_empty() {
                return Err(invalid("routes.bypass", "pattern values must not be empty"));
            }
        }

        let overlapping: Vec<&String> = self
            .routes
            .network_first
            .iter()
            .filter(|path| {
                self.routes.bypass.iter().any(|p| match p {
                    RoutePattern::PathContains(s) => path.contains(s.as_str()),
                    RoutePattern::Extension(ext) => {
                        path.to_ascii_lowercase().ends_with(&format!(".{}", ext.to_ascii_lowercase()))
                    }
                    _ => false,
                })
            })
            .collect();
        if !overlapping.is_empty() {
            tracing::warn!(
                paths = ?overlapping,
                "network_first paths also match bypass patterns; bypass takes precedence"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_cache_version() {
        let config = AppConfig { cache_version: "  ".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "cache_version"));
    }

    #[test]
    fn test_validate_origin_not_http() {
        let config = AppConfig { origin: "file:///srv/app".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "origin"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: Some(50), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { timeout_ms: Some(301_000), ..Default::default() }; // 5min 1sec
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_max_entry_bytes_zero() {
        let config = AppConfig { max_entry_bytes: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_entry_bytes"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "user_agent"));
    }

    #[test]
    fn test_validate_unrooted_network_first() {
        let mut config = AppConfig::default();
        config.routes.network_first.push("pricing".into());
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "routes.network_first"));
    }

    #[test]
    fn test_validate_precache_accepts_absolute_urls() {
        let config = AppConfig {
            precache: vec!["/".into(), "https://cdn.example.com/app.css".into()],
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = AppConfig { precache: vec!["app.css".into()], ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "precache"));
    }

    #[test]
    fn test_validate_empty_pattern() {
        let mut config = AppConfig::default();
        config.routes.bypass.push(RoutePattern::PathContains(String::new()));
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "routes.bypass"));
    }

    #[test]
    fn test_validate_overlap_is_allowed() {
        let mut config = AppConfig::default();
        config.routes.network_first.push("/api/status".into());
        assert!(config.validate().is_ok());
    }
}
