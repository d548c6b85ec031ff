//! engine_message tool implementation.
//!
//! Posts a control message to the engine as the server's own client and
//! reports any broadcast the client received in return.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waypost_engine::{ClientHandle, ControlOutcome, Engine, EngineMessage};

use super::json_result;

/// Input parameters for engine_message.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineMessageParams {
    /// The message payload. `"SKIP_WAITING"` and `"CLEAR_CACHE"` are understood;
    /// anything else is ignored.
    pub message: serde_json::Value,
}

/// Output structure for engine_message.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineMessageOutput {
    /// ignored, skipped_waiting or cache_cleared.
    pub outcome: String,
    /// Whether SKIP_WAITING moved an installed engine to active.
    pub activated: bool,
    /// Cache versions removed by CLEAR_CACHE.
    pub deleted: Vec<String>,
    /// Clients the CACHE_CLEARED broadcast reached.
    pub notified: usize,
    /// Message types this client has received since the last call.
    pub received: Vec<String>,
}

/// Implementation of the engine_message tool.
pub async fn message_impl(
    engine: &Engine, client: &mut ClientHandle, params: EngineMessageParams,
) -> Result<CallToolResult, McpError> {
    let outcome = engine.on_message(&params.message, client.id()).await?;

    let (outcome, activated, deleted, notified) = match outcome {
        ControlOutcome::Ignored => ("ignored", false, Vec::new(), 0),
        ControlOutcome::SkippedWaiting { activated } => ("skipped_waiting", activated, Vec::new(), 0),
        ControlOutcome::CacheCleared { deleted, notified } => {
            ("cache_cleared", false, deleted.iter().map(|v| v.to_string()).collect(), notified)
        }
    };
    let received = client
        .drain()
        .into_iter()
        .map(|message| match message {
            EngineMessage::CacheCleared => "CACHE_CLEARED".to_string(),
        })
        .collect();

    json_result(&EngineMessageOutput { outcome: outcome.to_string(), activated, deleted, notified, received })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{active_engine, result_json};
    use serde_json::json;

    #[tokio::test]
    async fn test_clear_cache_reports_broadcast() {
        let engine = active_engine("https://app.example.com").await;
        let mut client = engine.connect().await;
        let mut other = engine.connect().await;

        let result = message_impl(&engine, &mut client, EngineMessageParams { message: json!("CLEAR_CACHE") })
            .await
            .unwrap();
        let output = result_json(&result);

        assert_eq!(output["outcome"], "cache_cleared");
        assert_eq!(output["deleted"], json!(["app-v1"]));
        assert_eq!(output["notified"], 2);
        assert_eq!(output["received"], json!(["CACHE_CLEARED"]));
        assert_eq!(other.drain(), vec![EngineMessage::CacheCleared]);
    }

    #[tokio::test]
    async fn test_unknown_message_is_ignored() {
        let engine = active_engine("https://app.example.com").await;
        let mut client = engine.connect().await;

        let result = message_impl(&engine, &mut client, EngineMessageParams { message: json!({"type": "PING"}) })
            .await
            .unwrap();
        let output = result_json(&result);

        assert_eq!(output["outcome"], "ignored");
        assert_eq!(output["received"], json!([]));
        assert_eq!(engine.db().list_versions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_skip_waiting() {
        let engine = active_engine("https://app.example.com").await;
        let mut client = engine.connect().await;

        let result = message_impl(&engine, &mut client, EngineMessageParams { message: json!("SKIP_WAITING") })
            .await
            .unwrap();
        let output = result_json(&result);
        assert_eq!(output["outcome"], "skipped_waiting");
        assert_eq!(output["activated"], false);
    }
}
