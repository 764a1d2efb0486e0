//! cache_get tool implementation.
//!
//! Looks up the stored response for a GET request.

use casa_sw_client::ServiceWorkerState;
use casa_sw_core::{Error, RequestDescriptor};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute or root-relative URL of the cached GET request.
    pub url: String,

    /// Restrict the lookup to one generation; otherwise the latest write wins.
    #[serde(default)]
    pub generation: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(state: &ServiceWorkerState, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = state.resolve_url(&params.url)?;
    let request = RequestDescriptor::get(url.as_str());

    let hit = match &params.generation {
        Some(name) => state.db().open_generation(name).await?.match_request(&request).await?,
        None => state.db().match_request(&request).await?,
    };
    let response = hit.ok_or_else(|| Error::CacheMiss(url.clone()))?;

    json_result(&CacheGetOutput {
        url,
        generation: params.generation,
        status: response.status,
        body: response.text(),
        headers: response.headers,
    })
}
