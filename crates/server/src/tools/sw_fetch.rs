//! sw_fetch tool implementation.
//!
//! Runs one request through routing and the selected strategy.

use casa_sw_client::{Effect, ResponseSource, Route, ServiceWorkerState, Strategy, WorkerEvent};
use casa_sw_core::{RequestDescriptor, RequestDestination};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Input parameters for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Absolute or root-relative URL.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Optional Accept header.
    #[serde(default)]
    pub accept: Option<String>,

    /// What the caller is loading (default: other).
    #[serde(default)]
    pub destination: RequestDestination,

    /// Extra request headers as name/value pairs.
    #[serde(default)]
    pub headers: Vec<(String, String)>,

    /// Request body as UTF-8 text.
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for sw_fetch tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SwFetchOutput {
    pub url: String,
    pub route: Route,
    /// Strategy that produced the response; absent for bypassed requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub source: ResponseSource,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
}

pub async fn fetch_impl(state: &ServiceWorkerState, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let request = RequestDescriptor {
        method: params.method.to_ascii_uppercase(),
        url: params.url.clone(),
        accept: params.accept,
        destination: params.destination,
        headers: params.headers,
        body: params.body.map(String::into_bytes),
    };

    let Effect::Respond { route, outcome } = state.handle(WorkerEvent::Fetch(request)).await? else {
        return Err(ToolError::InvalidInput("fetch produced no response".into()).into());
    };

    json_result(&SwFetchOutput {
        url: params.url,
        route,
        strategy: outcome.strategy,
        source: outcome.source,
        status: outcome.response.status,
        body: outcome.response.text(),
        headers: outcome.response.headers,
    })
}
