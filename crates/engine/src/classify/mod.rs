//! Request classification.
//!
//! Every request the engine sees is either left alone (control surface,
//! filtered by an [`InterceptFilter`]) or assigned one [`Disposition`].
//! Classification is pure: it depends only on the request and the route
//! tables fixed at startup.
//!
//! Order, first match wins:
//! 1. Cross-origin non-safe method, or a `Range` request: BYPASS
//! 2. Any bypass pattern: BYPASS
//! 3. Path equal to a network-first path, or below it: NETWORK_FIRST
//! 4. Otherwise: CACHE_FIRST

pub mod filter;
pub mod pattern;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use url::Url;
use waypost_core::{AppConfig, Error, RouteConfig};

use crate::fetch::same_origin;
use crate::request::EngineRequest;

pub use filter::{InterceptFilter, PdfUserAgentFilter};
pub use pattern::CompiledPattern;

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Bypass,
    NetworkFirst,
    CacheFirst,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Bypass => "BYPASS",
            Disposition::NetworkFirst => "NETWORK_FIRST",
            Disposition::CacheFirst => "CACHE_FIRST",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was left unintercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassThroughReason {
    ControlSurface,
    Filtered,
    NotActive,
    InternalError,
}

/// Whether the engine takes a request at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    PassThrough(PassThroughReason),
    Intercept(Disposition),
}

/// Maps requests to dispositions using the configured route tables.
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Url,
    bypass: Vec<CompiledPattern>,
    network_first: Vec<String>,
    control_path: String,
    filter: Option<Arc<dyn InterceptFilter>>,
}

impl Classifier {
    /// Compile route tables for an origin.
    pub fn new(origin: Url, routes: &RouteConfig, control_path: impl Into<String>) -> Result<Self, Error> {
        let bypass = routes
            .bypass
            .iter()
            .map(CompiledPattern::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let network_first = routes
            .network_first
            .iter()
            .map(|p| if p.len() > 1 { p.trim_end_matches('/').to_string() } else { p.clone() })
            .collect();

        Ok(Self { origin, bypass, network_first, control_path: control_path.into(), filter: None })
    }

    /// Build from application configuration, installing the PDF user-agent
    /// filter when agents are configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        let classifier = Self::new(origin, &config.routes, config.control_path.clone())?;
        if config.pdf_passthrough_agents.is_empty() {
            Ok(classifier)
        } else {
            Ok(classifier.with_filter(Arc::new(PdfUserAgentFilter::new(&config.pdf_passthrough_agents))))
        }
    }

    /// Replace the pass-through predicate.
    pub fn with_filter(mut self, filter: Arc<dyn InterceptFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Decide whether to intercept and, if so, how.
    pub fn intercept(&self, request: &EngineRequest) -> Interception {
        if self.is_control_surface(request) {
            return Interception::PassThrough(PassThroughReason::ControlSurface);
        }
        if let Some(filter) = &self.filter
            && filter.should_pass_through(request)
        {
            return Interception::PassThrough(PassThroughReason::Filtered);
        }
        Interception::Intercept(self.classify(request))
    }

    /// Assign a disposition. Never fails; the default is CACHE_FIRST.
    pub fn classify(&self, request: &EngineRequest) -> Disposition {
        let cross_origin = !same_origin(&request.url, &self.origin);
        if cross_origin && !request.is_safe() {
            return Disposition::Bypass;
        }
        if request.is_range() {
            return Disposition::Bypass;
        }
        if self.bypass.iter().any(|p| p.matches(&request.url)) {
            return Disposition::Bypass;
        }
        if !cross_origin && self.is_network_first(request.url.path()) {
            return Disposition::NetworkFirst;
        }
        Disposition::CacheFirst
    }

    fn is_network_first(&self, path: &str) -> bool {
        self.network_first.iter().any(|route| {
            if route == "/" {
                path == "/"
            } else {
                path == route || path.strip_prefix(route.as_str()).is_some_and(|rest| rest.starts_with('/'))
            }
        })
    }

    fn is_control_surface(&self, request: &EngineRequest) -> bool {
        if !same_origin(&request.url, &self.origin) {
            return false;
        }
        let path = request.url.path();
        let control = self.control_path.trim_end_matches('/');
        path == control || path.strip_prefix(control).is_some_and(|rest| rest.starts_with('/'))
    }
}
