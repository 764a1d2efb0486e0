//! sw_message tool implementation.
//!
//! Delivers a page-to-worker message: skip-waiting, get-version, queue-sync.

use casa_sw_client::{ClientMessage, ServiceWorkerState, WorkerEvent};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::dispatch;

/// Input parameters for sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageParams {
    /// The message, tagged by `type`.
    pub message: ClientMessage,
}

pub async fn message_impl(state: &ServiceWorkerState, params: SwMessageParams) -> Result<CallToolResult, McpError> {
    dispatch(state, WorkerEvent::Message(params.message)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{output, state};

    #[tokio::test]
    async fn test_get_version() {
        let state = state().await;
        let params: SwMessageParams =
            serde_json::from_value(serde_json::json!({"message": {"type": "get-version"}})).unwrap();

        let out = output(&message_impl(&state, params).await.unwrap());

        assert_eq!(out["effect"], "version");
        assert_eq!(out["version"], "casa-de-casablanca-v1.0.0");
    }

    #[tokio::test]
    async fn test_skip_waiting_before_install() {
        let state = state().await;
        let params = SwMessageParams { message: ClientMessage::SkipWaiting };

        let out = output(&message_impl(&state, params).await.unwrap());

        assert_eq!(out["effect"], "skip-waiting");
        assert!(out["activation"].is_null());
    }
}
