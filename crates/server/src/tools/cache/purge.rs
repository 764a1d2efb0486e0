//! cache_purge tool implementation.
//!
//! Deletes whole generations, by name or everything not owned by the
//! running version.

use std::collections::HashSet;

use casa_sw_client::ServiceWorkerState;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Delete these generations.
    #[serde(default)]
    pub generations: Vec<String>,

    /// Delete every generation other than the current static and dynamic ones.
    #[serde(default)]
    pub superseded: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Names of deleted generations, oldest first.
    pub deleted: Vec<String>,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(state: &ServiceWorkerState, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.generations.is_empty() && !params.superseded {
        return Err(
            ToolError::InvalidInput("at least one of generations or superseded must be specified".into()).into(),
        );
    }

    let named: HashSet<String> = params.generations.into_iter().collect();
    let current = state.generations().clone();
    let superseded = params.superseded;

    let deleted = state
        .db()
        .purge(move |name| named.contains(name) || (superseded && !current.is_current(name)))
        .await?;

    json_result(&CachePurgeOutput { deleted })
}
