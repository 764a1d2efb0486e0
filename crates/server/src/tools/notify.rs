//! sw_push and sw_notification_click tool implementations.

use casa_sw_client::{ServiceWorkerState, WorkerEvent};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::dispatch;

/// Input parameters for sw_push tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwPushParams {
    /// Raw push payload, normally JSON `{title, body, data, icon?}`. Omit for an empty push.
    #[serde(default)]
    pub payload: Option<String>,
}

/// Input parameters for sw_notification_click tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwNotificationClickParams {
    /// Clicked action: "view" navigates, anything else only closes.
    #[serde(default)]
    pub action: Option<String>,

    /// The notification's data, e.g. `{"url": "/properties/42"}`.
    #[serde(default)]
    pub data: serde_json::Value,
}

pub async fn push_impl(state: &ServiceWorkerState, params: SwPushParams) -> Result<CallToolResult, McpError> {
    dispatch(state, WorkerEvent::Push { payload: params.payload.map(String::into_bytes) }).await
}

pub async fn click_impl(
    state: &ServiceWorkerState, params: SwNotificationClickParams,
) -> Result<CallToolResult, McpError> {
    dispatch(state, WorkerEvent::NotificationClick { action: params.action, data: params.data }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{output, state};

    #[tokio::test]
    async fn test_push_shows_notification() {
        let state = state().await;
        let params = SwPushParams { payload: Some(r#"{"title":"Open house","body":"Saturday 10am"}"#.into()) };

        let out = output(&push_impl(&state, params).await.unwrap());

        assert_eq!(out["effect"], "show-notification");
        assert_eq!(out["notification"]["title"], "Open house");
        assert_eq!(out["notification"]["require_interaction"], true);
    }

    #[tokio::test]
    async fn test_malformed_push_shows_nothing() {
        let state = state().await;
        let out = output(&push_impl(&state, SwPushParams { payload: Some("{".into()) }).await.unwrap());
        assert_eq!(out["effect"], "no-notification");
    }

    #[tokio::test]
    async fn test_view_click_opens_window() {
        let state = state().await;
        let params = SwNotificationClickParams {
            action: Some("view".into()),
            data: serde_json::json!({"url": "/properties/42"}),
        };

        let out = output(&click_impl(&state, params).await.unwrap());

        assert_eq!(out["outcome"]["result"], "opened");
        assert_eq!(out["outcome"]["client"]["url"], "https://casa.test/properties/42");
    }

    #[tokio::test]
    async fn test_dismiss_click() {
        let state = state().await;
        let params = SwNotificationClickParams { action: Some("dismiss".into()), data: serde_json::Value::Null };

        let out = output(&click_impl(&state, params).await.unwrap());

        assert_eq!(out["outcome"]["result"], "dismissed");
    }
}
