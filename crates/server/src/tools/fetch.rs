//! engine_fetch tool implementation.
//!
//! Offers one request to the engine and reports how it was served.

use std::collections::BTreeMap;

use futures_util::StreamExt;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waypost_core::Error;
use waypost_engine::{Body, Engine, EngineRequest};

use super::json_result;
use crate::error::ToolError;

/// Bodies larger than this are truncated in the tool output.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Input parameters for engine_fetch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineFetchParams {
    /// Path resolved against the configured origin, or an absolute URL.
    pub url: String,

    /// HTTP method (default GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HeaderPair {
    pub name: String,
    pub value: String,
}

/// Output structure for engine_fetch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineFetchOutput {
    /// Absolute request URL.
    pub url: String,
    /// BYPASS, NETWORK_FIRST or CACHE_FIRST. Absent when the engine passed the request through.
    pub disposition: Option<String>,
    /// network, cache or synthesized.
    pub source: String,
    pub status: u16,
    pub headers: Vec<HeaderPair>,
    /// Body preview as UTF-8, lossily decoded.
    pub body: String,
    /// Full body length, from `content-length` or a complete read. Absent
    /// when neither is available.
    pub body_bytes: Option<u64>,
    pub body_truncated: bool,
}

/// The leading bytes of a body, read no further than needed.
struct Preview {
    bytes: Vec<u8>,
    complete: bool,
}

/// Read at most `limit` bytes. A streamed body is consumed chunk by chunk
/// and abandoned once the limit is reached.
async fn read_preview(body: Body, limit: usize) -> Result<Preview, Error> {
    match body {
        Body::Full(bytes) => {
            Ok(Preview { bytes: bytes[..bytes.len().min(limit)].to_vec(), complete: bytes.len() <= limit })
        }
        Body::Stream(mut stream) => {
            let mut bytes = Vec::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                let room = limit - bytes.len();
                if chunk.len() > room {
                    bytes.extend_from_slice(&chunk[..room]);
                    return Ok(Preview { bytes, complete: false });
                }
                bytes.extend_from_slice(&chunk);
            }
            Ok(Preview { bytes, complete: true })
        }
    }
}

/// Implementation of the engine_fetch tool.
pub async fn fetch_impl(engine: &Engine, params: EngineFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let method = params.method.as_deref().unwrap_or("GET");
    let request = params.headers.iter().try_fold(
        EngineRequest::parse(method, params.url.trim(), engine.origin())?,
        |request, (name, value)| request.with_header(name, value),
    )?;

    let (disposition, response) = engine.fetch(&request).await?;
    let headers = response
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| HeaderPair { name: name.as_str().to_string(), value: v.to_string() })
        })
        .collect();
    let content_length = response
        .headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let preview = read_preview(response.body, MAX_BODY_BYTES).await?;
    let body_bytes = match content_length {
        Some(len) => Some(len),
        None if preview.complete => Some(preview.bytes.len() as u64),
        None => None,
    };

    let output = EngineFetchOutput {
        url: request.url.to_string(),
        disposition: disposition.map(|d| d.as_str().to_string()),
        source: response.source.as_str().to_string(),
        status: response.status.as_u16(),
        headers,
        body: String::from_utf8_lossy(&preview.bytes).into_owned(),
        body_bytes,
        body_truncated: !preview.complete,
    };

    json_result(&output)
}
