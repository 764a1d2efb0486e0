//! sw_sync tool implementation.

use casa_sw_client::{ServiceWorkerState, WorkerEvent};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::dispatch;

/// Input parameters for sw_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwSyncParams {
    /// Sync tag: "contact-form", "investment-inquiry", or "property-updates" when periodic.
    pub tag: String,

    /// Deliver as a periodic sync event.
    #[serde(default)]
    pub periodic: bool,
}

pub async fn sync_impl(state: &ServiceWorkerState, params: SwSyncParams) -> Result<CallToolResult, McpError> {
    let event = if params.periodic {
        WorkerEvent::PeriodicSync { tag: params.tag }
    } else {
        WorkerEvent::Sync { tag: params.tag }
    };
    dispatch(state, event).await
}
