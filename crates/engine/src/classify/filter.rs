//! Pluggable pass-through predicate.
//!
//! Some clients cannot cope with an intercepted fetch for certain
//! resources. A filter that returns true lets the request go to the
//! network as if the engine were not installed.

use std::fmt::Debug;

use crate::classify::pattern::has_extension;
use crate::request::EngineRequest;

/// Decides whether a request is left entirely unintercepted.
pub trait InterceptFilter: Send + Sync + Debug {
    fn should_pass_through(&self, request: &EngineRequest) -> bool;
}

/// Passes PDF requests through for matching user agents.
///
/// Matching is a case-insensitive substring test against `User-Agent`.
#[derive(Debug, Clone)]
pub struct PdfUserAgentFilter {
    agents: Vec<String>,
}

impl PdfUserAgentFilter {
    pub fn new<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let agents = agents
            .into_iter()
            .map(|a| a.as_ref().to_ascii_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        Self { agents }
    }
}

impl InterceptFilter for PdfUserAgentFilter {
    fn should_pass_through(&self, request: &EngineRequest) -> bool {
        if !has_extension(request.url.path(), "pdf") {
            return false;
        }
        let Some(agent) = request.user_agent() else {
            return false;
        };
        let agent = agent.to_ascii_lowercase();
        self.agents.iter().any(|needle| agent.contains(needle.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const IOS_SAFARI: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148";
    const DESKTOP: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0";

    fn request(target: &str, agent: Option<&str>) -> EngineRequest {
        let origin = Url::parse("https://app.example.com").unwrap();
        let request = EngineRequest::get(target, &origin).unwrap();
        match agent {
            Some(agent) => request.with_header("User-Agent", agent).unwrap(),
            None => request,
        }
    }

    #[test]
    fn test_matching_agent_pdf_passes_through() {
        let filter = PdfUserAgentFilter::new(["iPhone", "iPad"]);
        assert!(filter.should_pass_through(&request("/docs/terms.pdf", Some(IOS_SAFARI))));
    }

    #[test]
    fn test_other_agents_are_intercepted() {
        let filter = PdfUserAgentFilter::new(["iPhone", "iPad"]);
        assert!(!filter.should_pass_through(&request("/docs/terms.pdf", Some(DESKTOP))));
        assert!(!filter.should_pass_through(&request("/docs/terms.pdf", None)));
    }

    #[test]
    fn test_non_pdf_is_intercepted() {
        let filter = PdfUserAgentFilter::new(["iPhone"]);
        assert!(!filter.should_pass_through(&request("/app", Some(IOS_SAFARI))));
    }

    #[test]
    fn test_empty_agent_list_never_matches() {
        let filter = PdfUserAgentFilter::new(Vec::<String>::new());
        assert!(!filter.should_pass_through(&request("/docs/terms.pdf", Some(IOS_SAFARI))));
    }
}
