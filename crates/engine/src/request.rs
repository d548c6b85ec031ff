//! Request and response values that cross the interception boundary.

use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use url::Url;
use waypost_core::{CachedResponse, Error, RequestIdentity};

use crate::fetch::url::resolve;

/// A streamed response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// An outgoing request observed by the engine.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl EngineRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new() }
    }

    /// Build a GET for a path or absolute URL, resolved against `origin`.
    pub fn get(target: &str, origin: &Url) -> Result<Self, Error> {
        let url = resolve(target, origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(Method::GET, url))
    }

    /// Build a request with an arbitrary method name, e.g. `"post"` or `"DELETE"`.
    pub fn parse(method: &str, target: &str, origin: &Url) -> Result<Self, Error> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("method '{method}': {e}")))?;
        let url = resolve(target, origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(method, url))
    }

    /// Add a header, replacing any existing value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("header name '{name}': {e}")))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| Error::InvalidInput(format!("header value for '{name}': {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// GET and HEAD: reads that are safe to replay.
    pub fn is_safe(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// Whether the request asks for a byte range.
    pub fn is_range(&self) -> bool {
        self.headers.contains_key(header::RANGE)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
    }

    /// Cache identity: method, absolute URL, and the listed headers present on the request.
    pub fn identity(&self, vary_headers: &[String]) -> RequestIdentity {
        vary_headers.iter().fold(
            RequestIdentity::new(self.method.as_str(), self.url.as_str()),
            |identity, name| match self.headers.get(name.as_str()).and_then(|v| v.to_str().ok()) {
                Some(value) => identity.with_header(name, value),
                None => identity,
            },
        )
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    Synthesized,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Synthesized => "synthesized",
        }
    }
}

/// Response body: buffered, or a stream passed through untouched.
pub enum Body {
    Full(Bytes),
    Stream(BodyStream),
}

impl Body {
    /// Collect the body into memory.
    pub async fn into_bytes(self) -> Result<Bytes, Error> {
        match self {
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// The buffered bytes, if the body is not a stream.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Full(bytes) => Some(bytes),
            Body::Stream(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A response handed back across the interception boundary.
#[derive(Debug)]
pub struct EngineResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    pub source: ResponseSource,
}

impl EngineResponse {
    /// The terminal NETWORK_FIRST failure: offline with nothing cached.
    pub fn service_unavailable() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Body::Full(Bytes::from_static(b"Service Unavailable")),
            source: ResponseSource::Synthesized,
        }
    }

    /// Rebuild a response from a stored snapshot.
    ///
    /// Headers that no longer parse are dropped rather than failing the hit.
    pub fn from_cached(cached: CachedResponse) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &cached.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }
        Self {
            status: StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK),
            headers,
            body: Body::Full(Bytes::from(cached.body)),
            source: ResponseSource::Cache,
        }
    }

    /// Snapshot a buffered response for storage.
    ///
    /// Returns None for streamed bodies, which are never stored.
    pub fn to_cached(&self) -> Option<CachedResponse> {
        let body = self.body.as_bytes()?;
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();
        Some(CachedResponse { status: self.status.as_u16(), headers, body: body.to_vec() })
    }

    /// Make sure the body is held in memory.
    pub async fn buffered(self) -> Result<Self, Error> {
        match self.body {
            Body::Full(_) => Ok(self),
            Body::Stream(_) => {
                let Self { status, headers, body, source } = self;
                let bytes = body.into_bytes().await?;
                Ok(Self { status, headers, body: Body::Full(bytes), source })
            }
        }
    }
}
