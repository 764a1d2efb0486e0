//! sw_client tool implementation.
//!
//! Tells the worker a page opened or closed.

use casa_sw_client::{ServiceWorkerState, WorkerEvent};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::dispatch;
use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClientAction {
    Connect,
    Disconnect,
}

/// Input parameters for sw_client tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwClientParams {
    pub action: ClientAction,

    /// Client identifier chosen by the host.
    pub id: String,

    /// Page URL; required for connect.
    #[serde(default)]
    pub url: Option<String>,
}

pub async fn client_impl(state: &ServiceWorkerState, params: SwClientParams) -> Result<CallToolResult, McpError> {
    if params.id.is_empty() {
        return Err(ToolError::InvalidInput("id cannot be empty".into()).into());
    }

    let event = match params.action {
        ClientAction::Connect => {
            let url = params.url.ok_or_else(|| ToolError::InvalidInput("connect requires a url".into()))?;
            WorkerEvent::ClientConnected { id: params.id, url }
        }
        ClientAction::Disconnect => WorkerEvent::ClientDisconnected { id: params.id },
    };
    dispatch(state, event).await
}
