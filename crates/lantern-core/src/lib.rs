//! Core library for Lantern, an agentic task-execution engine.
//!
//! Lantern turns a natural-language request about a software project into
//! an ordered list of objectives, expands each objective into concrete tool
//! calls, executes them against the project tree with bounded retries, and
//! reports progress to observers in real time.
//!
//! # Architecture
//!
//! - **Project modeling** ([`modeler`]): cached structural summary of a
//!   project, from the completion service or a heuristic fallback
//! - **Orchestration** ([`engine`]): planner, decomposer, execution pipeline
//!   and the single-loop agent
//! - **Tools** ([`tools`]): explicit registry, validating dispatcher and
//!   retry controller
//! - **State** ([`store`], [`db`]): SQLite-backed sessions, objectives,
//!   subtask groups and messages
//! - **Progress** ([`events`]): sequenced events fanned out to observers
//! - **Coordination** ([`runs`]): one background run per session with stop
//!   signals
//! - **Presentation** ([`display`]): markdown `Display` wrappers shared by
//!   the CLI and the MCP server
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use lantern_core::{
//!     completion::CommandCompletion, params::StartRun, Broadcaster, Engine, EngineConfig,
//!     RunManager, StateStore, ToolRegistry,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = StateStore::open("lantern.db").await?;
//! let broadcaster = Broadcaster::new();
//! let mut events = broadcaster.subscribe();
//!
//! let engine = Engine::new(
//!     store,
//!     broadcaster,
//!     Arc::new(CommandCompletion::new("my-model-cli", Duration::from_secs(300))),
//!     Arc::new(ToolRegistry::builtin()),
//!     EngineConfig::default(),
//! );
//! let runs = RunManager::new(engine);
//!
//! let session = runs
//!     .start_run(StartRun {
//!         request: "add a contact form".to_string(),
//!         project: "./site".to_string(),
//!         ..StartRun::default()
//!     })
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("#{} {:?}", event.seq, event.event);
//!     if event.event.session_id() == session && event.event.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod completion;
pub mod config;
pub mod db;
pub mod display;
pub mod engine;
pub mod error;
pub mod events;
pub mod modeler;
pub mod models;
pub mod params;
pub mod process;
pub mod runs;
pub mod store;
pub mod tools;

// Re-export commonly used types
pub use completion::{CommandCompletion, CompletionRequest, CompletionService, CompletionTask};
pub use config::EngineConfig;
pub use db::Database;
pub use display::{LocalDateTime, OperationStatus, RunResult, SessionReport, SessionSummaries, ToolCatalog};
pub use engine::{AgentOutcome, Engine, RunReport};
pub use error::{EngineError, Result};
pub use events::{Broadcaster, ProgressEvent, RunEvent};
pub use models::{
    Message, MessageKind, MessageRole, Objective, ObjectiveStatus, ProjectSummary, Session,
    SessionSnapshot, SessionSummary, SubtaskEntry, SubtaskGroup, SubtaskStatus,
};
pub use params::{RunMode, SessionId, StartRun};
pub use runs::RunManager;
pub use store::{StateStore, StoreLocation};
pub use tools::{ToolDispatcher, ToolRegistry, ToolResult, ToolSpec};
