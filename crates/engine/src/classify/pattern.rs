//! Compiled route patterns.

use regex::Regex;
use url::Url;
use waypost_core::{Error, RoutePattern};

/// A [`RoutePattern`] ready for matching.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    /// Lower-cased extension without the dot.
    Extension(String),
    UrlContains(String),
    /// Lower-cased host substring.
    HostContains(String),
    PathContains(String),
    Regex(Regex),
}

impl CompiledPattern {
    /// Compile a configured pattern.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if a regex does not compile.
    pub fn compile(pattern: &RoutePattern) -> Result<Self, Error> {
        Ok(match pattern {
            RoutePattern::Extension(ext) => {
                CompiledPattern::Extension(ext.trim_start_matches("*.").trim_start_matches('.').to_ascii_lowercase())
            }
            RoutePattern::UrlContains(s) => CompiledPattern::UrlContains(s.clone()),
            RoutePattern::HostContains(s) => CompiledPattern::HostContains(s.to_ascii_lowercase()),
            RoutePattern::PathContains(s) => CompiledPattern::PathContains(s.clone()),
            RoutePattern::Regex(re) => {
                CompiledPattern::Regex(Regex::new(re).map_err(|e| Error::InvalidPattern(format!("{re}: {e}")))?)
            }
        })
    }

    /// Whether the absolute URL matches.
    pub fn matches(&self, url: &Url) -> bool {
        match self {
            CompiledPattern::Extension(ext) => has_extension(url.path(), ext),
            CompiledPattern::UrlContains(s) => url.as_str().contains(s.as_str()),
            CompiledPattern::HostContains(s) => url.host_str().is_some_and(|host| host.contains(s.as_str())),
            CompiledPattern::PathContains(s) => url.path().contains(s.as_str()),
            CompiledPattern::Regex(re) => re.is_match(url.as_str()),
        }
    }
}

/// Case-insensitive check that the last path segment ends in `.ext`.
pub(crate) fn has_extension(path: &str, ext: &str) -> bool {
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((stem, found)) => !stem.is_empty() && found.eq_ignore_ascii_case(ext),
        None => false,
    }
}
