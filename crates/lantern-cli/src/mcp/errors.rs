//! Error handling utilities for the MCP server

use lantern_core::EngineError;
use rmcp::ErrorData;

/// Maps engine errors to MCP errors. Unknown sessions are the caller's
/// mistake and surface as invalid params.
pub fn to_mcp_error(message: &str, error: &EngineError) -> ErrorData {
    match error {
        EngineError::SessionNotFound { .. } | EngineError::InvalidInput { .. } => {
            ErrorData::invalid_params(format!("{message}: {error}"), None)
        }
        _ => ErrorData::internal_error(format!("{message}: {error}"), None),
    }
}
