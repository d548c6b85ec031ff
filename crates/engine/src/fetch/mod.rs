//! HTTP transport for the engine.
//!
//! ### Fetch modes
//! - `Standard`: the plain fetch. Content decoding enabled, body buffered.
//! - `Direct`: used for BYPASS. Ambient cookies are not sent and no
//!   content decoding happens; the body is streamed as received so
//!   partial-content (206) responses reach the caller byte-exact.
//!   Headers the caller set itself (`Authorization`, `Range`,
//!   conditional headers) go out unchanged.
//!
//! ### URL Resolution
//! - Rooted paths resolve against the application origin
//! - Lowercase host, remove fragments
//! - Preserve query string

pub mod url;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{self, HeaderMap};
use reqwest::Client;
use waypost_core::{AppConfig, Error};

use crate::request::{Body, EngineRequest, EngineResponse, ResponseSource};

pub use self::url::{UrlError, resolve, same_origin};

/// How a request is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Standard,
    Direct,
}

/// Something that can perform network fetches for the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one fetch. Any HTTP status is a success; only transport
    /// failures are errors.
    async fn fetch(&self, request: &EngineRequest, mode: FetchMode) -> Result<EngineResponse, Error>;
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent sent when the request carries none (default: "waypost/0.1")
    pub user_agent: String,

    /// Request timeout (default: none, the transport's own behavior)
    pub timeout: Option<Duration>,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "waypost/0.1".to_string(), timeout: None, max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), max_redirects: config.max_redirects }
    }
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http: Client,
    direct: Client,
}

impl HttpTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .no_gzip()
            .no_brotli()
            .no_deflate();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let direct = builder
            .build()
            .map_err(|e| Error::Network(format!("failed to build direct HTTP client: {e}")))?;

        Ok(Self { http, direct })
    }
}

fn map_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::FetchTimeout(err.to_string()) } else { Error::Network(err.to_string()) }
}

/// Direct fetches never carry the ambient cookie jar.
fn direct_headers(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    headers.remove(header::COOKIE);
    headers
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &EngineRequest, mode: FetchMode) -> Result<EngineResponse, Error> {
        let start = Instant::now();
        let (client, headers) = match mode {
            FetchMode::Standard => (&self.http, request.headers.clone()),
            FetchMode::Direct => (&self.direct, direct_headers(&request.headers)),
        };

        let response = client
            .request(request.method.clone(), request.url.as_str())
            .headers(headers)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let headers = response.headers().clone();

        let body = match mode {
            FetchMode::Standard => Body::Full(response.bytes().await.map_err(map_send_error)?),
            FetchMode::Direct => {
                Body::Stream(Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(map_send_error))))
            }
        };

        tracing::debug!(
            "fetched {} {} ({:?}) -> {} in {}ms",
            request.method,
            request.url,
            mode,
            status.as_u16(),
            start.elapsed().as_millis()
        );

        Ok(EngineResponse { status, headers, body, source: ResponseSource::Network })
    }
}
