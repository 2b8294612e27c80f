//! MCP server for Lantern.
//!
//! Exposes read-only inspection of sessions and the tool catalogue over the
//! Model Context Protocol on stdio.

use std::{future::Future, sync::Arc};

use anyhow::Result;
use lantern_core::{StateStore, ToolRegistry};
use log::{debug, error, info};
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler,
};
use tokio::signal::unix::{signal, SignalKind};

pub mod errors;
pub mod handlers;

pub use handlers::{McpResult, SessionId};

#[derive(Clone)]
pub struct LanternMcpServer {
    store: StateStore,
    registry: Arc<ToolRegistry>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl LanternMcpServer {
    pub fn new(store: StateStore, registry: Arc<ToolRegistry>) -> Self {
        Self {
            store,
            registry,
            tool_router: Self::tool_router(),
        }
    }

    fn handlers(&self) -> handlers::McpHandlers {
        handlers::McpHandlers::new(self.store.clone(), Arc::clone(&self.registry))
    }

    #[tool(
        name = "list_sessions",
        description = "List execution sessions, most recently active first. Each entry shows the session ID, project root and how many objectives are done or failed."
    )]
    async fn list_sessions(&self) -> McpResult {
        self.handlers().list_sessions().await
    }

    #[tool(
        name = "show_session",
        description = "Show one session: its objectives in order with their status and failure reasons, the subtasks each objective was decomposed into with attempt counts, and the latest run summary."
    )]
    async fn show_session(&self, params: Parameters<SessionId>) -> McpResult {
        self.handlers().show_session(params).await
    }

    #[tool(
        name = "list_tools",
        description = "List the tools subtasks can call, with their parameter names, kinds and whether each is optional."
    )]
    async fn list_tools(&self) -> McpResult {
        self.handlers().list_tools()
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for LanternMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "lantern".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(r#"Lantern executes natural-language requests against a software project: it plans ordered objectives, decomposes each into tool calls, and runs them with bounded retries.

## Concepts
- **Session**: one conversation about one project root, holding objectives and messages
- **Objective**: one step of the plan (pending, running, done or failed)
- **Subtask**: one concrete tool call produced for an objective (pending, running, done or skipped)

## Tools
- `list_sessions` to find a session ID
- `show_session` to inspect progress and failure reasons
- `list_tools` to see what subtasks can do"#.to_string()),
        }
    }
}

/// Run the MCP server with stdio transport
pub async fn run_stdio_server(server: LanternMcpServer) -> Result<()> {
    use rmcp::{transport::stdio, ServiceExt};

    info!("Starting Lantern MCP server on stdio");
    debug!(
        "Server created with {} tools",
        server.tool_router.list_all().len()
    );

    let service = server.serve(stdio()).await.inspect_err(|e| {
        error!("serving error: {e:?}");
    })?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = service.waiting() => {
            match result {
                Ok(_) => info!("MCP server stopped normally"),
                Err(e) => error!("MCP server error: {e:?}"),
            }
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }

    info!("MCP server shutdown complete");
    Ok(())
}
