//! MCP tool implementations.
//!
//! Each worker tool translates its parameters into one `WorkerEvent` and
//! returns the resulting effect as JSON text. The cache tools talk to the
//! store directly.

pub mod cache;
pub mod lifecycle;
pub mod notify;
pub mod sw_client;
pub mod sw_fetch;
pub mod sw_message;
pub mod sw_sync;

use casa_sw_client::{Effect, ServiceWorkerState, WorkerEvent};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

/// Render any serializable output as a pretty JSON text result.
pub fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Serialization(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Dispatch one event and render its effect.
pub async fn dispatch(state: &ServiceWorkerState, event: WorkerEvent) -> Result<CallToolResult, McpError> {
    let effect: Effect = state.handle(event).await?;
    json_result(&effect)
}

#[cfg(test)]
pub(crate) mod testing {
    //! A fixed in-memory site standing in for the origin.

    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use casa_sw_client::{Network, ServiceWorkerState};
    use casa_sw_core::{AppConfig, CacheDb, Error, RequestDescriptor, StoredResponse};
    use rmcp::model::CallToolResult;

    pub struct StaticSite {
        pages: HashMap<String, StoredResponse>,
    }

    #[async_trait]
    impl Network for StaticSite {
        async fn fetch(&self, request: &RequestDescriptor) -> Result<StoredResponse, Error> {
            let key = format!("{} {}", request.method.to_ascii_uppercase(), request.url);
            self.pages.get(&key).cloned().ok_or_else(|| Error::Network(format!("offline: {key}")))
        }
    }

    pub fn config() -> AppConfig {
        AppConfig {
            origin: "https://casa.test".into(),
            precache_manifest: vec!["/".into(), "/offline.html".into()],
            ..Default::default()
        }
    }

    /// Serves the manifest plus the contact endpoint.
    pub fn site() -> StaticSite {
        let pages = [
            ("GET https://casa.test/", StoredResponse::with_content_type(200, "text/html", "home")),
            ("GET https://casa.test/offline.html", StoredResponse::with_content_type(200, "text/html", "offline")),
            ("POST https://casa.test/api/contact", StoredResponse::with_content_type(200, "application/json", "{}")),
        ];
        StaticSite { pages: pages.into_iter().map(|(k, v)| (k.to_string(), v)).collect() }
    }

    pub async fn state() -> ServiceWorkerState {
        let db = CacheDb::open_in_memory().await.unwrap();
        ServiceWorkerState::new(&config(), db, Arc::new(site())).unwrap()
    }

    /// Parse the JSON text of a tool result.
    pub fn output(result: &CallToolResult) -> serde_json::Value {
        let content = serde_json::to_value(&result.content[0]).unwrap();
        let text = content.get("text").and_then(|v| v.as_str()).expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
