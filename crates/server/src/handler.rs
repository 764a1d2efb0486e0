//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use casa_sw_client::ServiceWorkerState;
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

use crate::tools::{
    cache::{CachePurgeParams, CacheGetParams, get_impl, purge_impl},
    lifecycle::{activate_impl, install_impl},
    notify::{SwNotificationClickParams, SwPushParams, click_impl, push_impl},
    sw_client::{SwClientParams, client_impl},
    sw_fetch::{SwFetchParams, fetch_impl},
    sw_message::{SwMessageParams, message_impl},
    sw_sync::{SwSyncParams, sync_impl},
};

/// The main MCP server handler for casa-sw.
#[derive(Clone)]
pub struct CasaSwServer {
    state: Arc<ServiceWorkerState>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CasaSwServer {
    /// Create a new server handler around a worker.
    pub fn new(state: Arc<ServiceWorkerState>) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Install the worker: fetch every precache manifest URL into the static cache. All or nothing."
    )]
    async fn sw_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.state).await
    }

    #[tool(
        description = "Activate the installed worker: delete superseded cache generations and claim open clients. Reports waiting when other versions still control clients and skip-waiting is off."
    )]
    async fn sw_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.state).await
    }

    /// Intercept one request.
    ///
    /// Routing picks bypass or a strategy; the response reports which strategy
    /// ran and whether it came from the network, the cache, a fallback, or
    /// the synthetic 408.
    #[tool(
        description = "Intercept a request: route it to cache-first, network-first, stale-while-revalidate or bypass and return the response with its strategy and source."
    )]
    async fn sw_fetch(&self, params: Parameters<SwFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.state, params.0).await
    }

    #[tool(
        description = "Deliver a background sync event. Tags: contact-form, investment-inquiry; with periodic=true, property-updates."
    )]
    async fn sw_sync(&self, params: Parameters<SwSyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.state, params.0).await
    }

    #[tool(
        description = "Deliver a push event. Returns the notification to show, or nothing for an empty or malformed payload."
    )]
    async fn sw_push(&self, params: Parameters<SwPushParams>) -> Result<CallToolResult, McpError> {
        push_impl(&self.state, params.0).await
    }

    #[tool(description = "Deliver a notification click. The view action focuses or opens a window at data.url.")]
    async fn sw_notification_click(
        &self, params: Parameters<SwNotificationClickParams>,
    ) -> Result<CallToolResult, McpError> {
        click_impl(&self.state, params.0).await
    }

    #[tool(description = "Post a message to the worker: skip-waiting, get-version, or queue-sync {kind, payload}.")]
    async fn sw_message(&self, params: Parameters<SwMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.state, params.0).await
    }

    #[tool(description = "Connect or disconnect a client page.")]
    async fn sw_client(&self, params: Parameters<SwClientParams>) -> Result<CallToolResult, McpError> {
        client_impl(&self.state, params.0).await
    }

    #[tool(description = "Retrieve the cached response for a GET URL, optionally from one generation.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.state, params.0).await
    }

    #[tool(description = "Delete cache generations by name, or every generation not owned by the running version.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.state, params.0).await
    }
}

impl ServerHandler for CasaSwServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "casa-sw".into(),
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
