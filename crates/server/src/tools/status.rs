//! engine_status tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waypost_engine::Engine;

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VersionStatus {
    pub name: String,
    pub entries: u64,
    /// Whether this is the version the engine serves.
    pub current: bool,
}

/// Output structure for engine_status.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineStatusOutput {
    /// The cache version this engine serves.
    pub version: String,
    pub origin: String,
    /// parsed, installing, installed, activating or active.
    pub phase: String,
    /// Connected clients.
    pub clients: usize,
    /// Every cache version present in storage.
    pub versions: Vec<VersionStatus>,
}

/// Implementation of the engine_status tool.
pub async fn status_impl(engine: &Engine) -> Result<CallToolResult, McpError> {
    let mut versions = Vec::new();
    for version in engine.db().list_versions().await? {
        let entries = engine.db().count_version_entries(&version).await?;
        let current = &version == engine.version();
        versions.push(VersionStatus { name: version.to_string(), entries, current });
    }

    let output = EngineStatusOutput {
        version: engine.version().to_string(),
        origin: engine.origin().to_string(),
        phase: engine.phase().await.as_str().to_string(),
        clients: engine.client_count().await,
        versions,
    };

    json_result(&output)
}
