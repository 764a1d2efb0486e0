//! Structured errors for tool parameter handling.
//!
//! Worker and cache failures already convert from `casa_sw_core::Error`;
//! these cover what the tool layer itself rejects.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid input parameters (e.g., connect without a URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// An effect could not be rendered as JSON.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::InvalidInput(_) => -32602,
            ToolError::Serialization(_) => -32000,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
