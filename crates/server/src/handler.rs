//! MCP server handler implementation.
//!
//! Routes tool calls to the engine. The server registers itself as one
//! engine client so control-channel broadcasts have somewhere to land.
use std::sync::Arc;

use crate::tools::fetch::{EngineFetchParams, fetch_impl};
use crate::tools::message::{EngineMessageParams, message_impl};
use crate::tools::status::status_impl;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use tokio::sync::Mutex;
use waypost_engine::{ClientHandle, Engine};

/// The MCP server handler for waypost.
#[derive(Clone)]
pub struct WaypostServer {
    engine: Arc<Engine>,
    client: Arc<Mutex<ClientHandle>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl WaypostServer {
    pub fn new(engine: Arc<Engine>, client: ClientHandle) -> Self {
        Self { engine, client: Arc::new(Mutex::new(client)), tool_router: Self::tool_router() }
    }

    /// Send a request through the engine.
    #[tool(
        description = "Send a request through the caching engine. Returns the routing disposition, whether the response came from network or cache, status, headers and body."
    )]
    async fn engine_fetch(&self, params: Parameters<EngineFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.engine, params.0).await
    }

    /// Post a control message.
    #[tool(
        description = "Post a control message to the engine. \"SKIP_WAITING\" lets an installed version activate; \"CLEAR_CACHE\" deletes every cache version and notifies connected clients."
    )]
    async fn engine_message(&self, params: Parameters<EngineMessageParams>) -> Result<CallToolResult, McpError> {
        let mut client = self.client.lock().await;
        message_impl(&self.engine, &mut client, params.0).await
    }

    /// Report lifecycle and storage state.
    #[tool(description = "Report the engine's cache version, lifecycle phase, connected clients and stored cache versions.")]
    async fn engine_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.engine).await
    }
}

impl ServerHandler for WaypostServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "waypost".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
