//! MCP tool handlers.
//!
//! The MCP surface is read-only: assistants can inspect sessions and the
//! tool catalogue, but runs are started from the CLI or the observer
//! server.

use std::sync::Arc;

use lantern_core::{
    display::{SessionReport, SessionSummaries, ToolCatalog},
    params as core, StateStore, ToolRegistry,
};
use log::debug;
use rmcp::{
    handler::server::tool::Parameters,
    model::{CallToolResult, Content},
    ErrorData,
};
use schemars::JsonSchema;
use serde::Deserialize;

use super::errors::to_mcp_error;

/// Transparent wrapper adding MCP deserialization and schema generation to
/// a core parameter type, keeping the core types free of protocol concerns.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct McpParams<T>(T)
where
    T: JsonSchema;

impl<T> JsonSchema for McpParams<T>
where
    T: JsonSchema,
{
    fn schema_name() -> std::borrow::Cow<'static, str> {
        T::schema_name()
    }

    fn json_schema(g: &mut schemars::SchemaGenerator) -> schemars::Schema {
        T::json_schema(g)
    }
}

impl<T> AsRef<T> for McpParams<T>
where
    T: JsonSchema,
{
    fn as_ref(&self) -> &T {
        &self.0
    }
}

pub type SessionId = McpParams<core::SessionId>;

pub type McpResult = Result<CallToolResult, ErrorData>;

pub struct McpHandlers {
    store: StateStore,
    registry: Arc<ToolRegistry>,
}

impl McpHandlers {
    pub fn new(store: StateStore, registry: Arc<ToolRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn list_sessions(&self) -> McpResult {
        let sessions = self
            .store
            .list_sessions()
            .await
            .map_err(|e| to_mcp_error("Failed to list sessions", &e))?;

        let sessions = SessionSummaries(sessions);
        let result = if sessions.is_empty() {
            "# No sessions found\n".to_string()
        } else {
            format!("# Sessions\n\n{sessions}")
        };
        Ok(CallToolResult::success(vec![Content::text(result)]))
    }

    pub async fn show_session(&self, Parameters(params): Parameters<SessionId>) -> McpResult {
        debug!("show_session: {params:?}");
        let session_id = params.as_ref().session.as_str();

        let snapshot = self
            .store
            .snapshot(session_id)
            .await
            .map_err(|e| to_mcp_error("Failed to load session", &e))?;
        let messages = self
            .store
            .get_messages(session_id)
            .await
            .map_err(|e| to_mcp_error("Failed to load session messages", &e))?;

        let report = SessionReport::new(snapshot).with_messages(&messages);
        Ok(CallToolResult::success(vec![Content::text(
            report.to_string(),
        )]))
    }

    pub fn list_tools(&self) -> McpResult {
        let catalog = ToolCatalog(self.registry.specs());
        Ok(CallToolResult::success(vec![Content::text(format!(
            "# Tools\n\n{catalog}"
        ))]))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn handlers() -> (McpHandlers, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path().join("mcp.db")).await.unwrap();
        (
            McpHandlers::new(store, Arc::new(ToolRegistry::builtin())),
            dir,
        )
    }

    fn text(result: &CallToolResult) -> String {
        serde_json::to_value(&result.content).unwrap()[0]["text"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_list_sessions_empty() {
        let (handlers, _dir) = handlers().await;
        let result = handlers.list_sessions().await.unwrap();
        assert!(text(&result).contains("No sessions found"));
    }

    #[tokio::test]
    async fn test_show_unknown_session_is_invalid_params() {
        let (handlers, _dir) = handlers().await;
        let params: SessionId =
            serde_json::from_value(serde_json::json!({"session": "missing"})).unwrap();
        let error = handlers.show_session(Parameters(params)).await.unwrap_err();
        assert_eq!(error.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_list_tools_names_builtins() {
        let (handlers, _dir) = handlers().await;
        let result = handlers.list_tools().unwrap();
        let body = text(&result);
        assert!(body.contains("`read_file`"));
        assert!(body.contains("`run_command`"));
    }
}
