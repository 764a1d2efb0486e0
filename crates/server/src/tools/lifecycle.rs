//! sw_install and sw_activate tool implementations.

use casa_sw_client::{ServiceWorkerState, WorkerEvent};
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::dispatch;

/// Precache the manifest into the static generation.
pub async fn install_impl(state: &ServiceWorkerState) -> Result<CallToolResult, McpError> {
    dispatch(state, WorkerEvent::Install).await
}

/// Purge superseded generations and claim clients.
pub async fn activate_impl(state: &ServiceWorkerState) -> Result<CallToolResult, McpError> {
    dispatch(state, WorkerEvent::Activate).await
}
