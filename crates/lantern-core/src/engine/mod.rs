//! Orchestration: modeling, planning, decomposition and execution.
//!
//! [`Engine`] wires the collaborators of one process together. Every run
//! gets a fresh [`ToolDispatcher`] scoped to the session's project root; the
//! registry, the store and the broadcaster are shared.

use std::{path::Path, sync::Arc};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub mod agent;
pub mod decomposer;
pub mod pipeline;
pub mod planner;

pub use agent::{parse_action, AgentAction, AgentContext, AgentOutcome, SingleLoopAgent};
pub use decomposer::{parse_subtasks, Decomposer};
pub use pipeline::{local_summary, ExecutionPipeline, RunContext, RunReport, CANCELLED_REASON};
pub use planner::{fallback_plan, parse_objectives, PlanOutcome, Planner};

use crate::{
    completion::CompletionService,
    config::EngineConfig,
    error::{EngineError, Result},
    events::Broadcaster,
    modeler::ProjectModeler,
    models::{MessageKind, MessageRole},
    store::StateStore,
    tools::{RetryController, RetryPolicy, ToolContext, ToolDispatcher, ToolRegistry},
};

/// Shared collaborators of all runs.
#[derive(Clone)]
pub struct Engine {
    store: StateStore,
    broadcaster: Broadcaster,
    completion: Arc<dyn CompletionService>,
    registry: Arc<ToolRegistry>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: StateStore,
        broadcaster: Broadcaster,
        completion: Arc<dyn CompletionService>,
        registry: Arc<ToolRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            completion,
            registry,
            config,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn controller(&self, root: &Path) -> RetryController {
        let dispatcher = ToolDispatcher::new(
            Arc::clone(&self.registry),
            ToolContext::new(root, self.config.command_timeout),
        );
        RetryController::new(Arc::new(dispatcher), RetryPolicy::from(&self.config))
    }

    fn modeler(&self) -> ProjectModeler {
        ProjectModeler::new(Arc::clone(&self.completion), self.config.scan_limit)
    }

    fn pipeline(&self, root: &Path) -> ExecutionPipeline {
        ExecutionPipeline::new(
            self.store.clone(),
            self.broadcaster.clone(),
            Arc::clone(&self.completion),
            Decomposer::new(Arc::clone(&self.completion), self.config.max_subtasks),
            self.controller(root),
        )
    }

    /// Models the project, plans `request` and executes the plan.
    pub async fn run_plan(
        &self,
        session_id: &str,
        request: &str,
        root: &Path,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let summary = self.modeler().summarize(root, request).await;

        let planner = Planner::new(
            Arc::clone(&self.completion),
            self.store.clone(),
            self.broadcaster.clone(),
            self.config.max_objectives,
        );
        let plan = planner.plan(session_id, request, &summary).await?;

        let ctx = RunContext {
            session_id: session_id.to_string(),
            request: request.to_string(),
            summary,
            objective_ids: plan.objectives.iter().map(|o| o.id).collect(),
            plan_message_id: Some(plan.message_id),
            cancel,
        };
        self.pipeline(root).run(&ctx).await
    }

    /// Runs `request` through the single-loop agent.
    pub async fn run_agent(
        &self,
        session_id: &str,
        request: &str,
        root: &Path,
        cancel: CancellationToken,
    ) -> Result<AgentOutcome> {
        let summary = self.modeler().summarize(root, request).await;
        let agent = SingleLoopAgent::new(
            self.store.clone(),
            self.broadcaster.clone(),
            Arc::clone(&self.completion),
            self.controller(root),
            &self.config,
        );

        let ctx = AgentContext {
            session_id: session_id.to_string(),
            request: request.to_string(),
            summary,
            cancel,
        };
        agent.run(&ctx).await
    }

    /// Continues a session's non-terminal objectives after an interruption.
    ///
    /// # Errors
    ///
    /// * `EngineError::SessionNotFound` - If the session does not exist
    /// * `EngineError::InvalidInput` - If the session has no project root or
    ///   no plan
    pub async fn resume(&self, session_id: &str, cancel: CancellationToken) -> Result<RunReport> {
        let session =
            self.store
                .get_session(session_id)
                .await?
                .ok_or_else(|| EngineError::SessionNotFound {
                    id: session_id.to_string(),
                })?;
        let root = session.project_root.ok_or_else(|| {
            EngineError::invalid_input("session").with_reason("Session has no project root")
        })?;
        let objectives = self.store.get_objectives(session_id).await?;
        if objectives.is_empty() {
            return Err(EngineError::invalid_input("session")
                .with_reason("Session has no plan to resume"));
        }

        let messages = self.store.get_messages(session_id).await?;
        let plan = messages
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::Plan);
        // Only the latest plan is resumed; earlier plans keep their state
        let objective_ids = match plan {
            Some(message) => plan_objective_ids(&message.payload),
            None => objectives.iter().map(|o| o.id).collect(),
        };
        let request = plan
            .or_else(|| {
                messages
                    .iter()
                    .rev()
                    .find(|m| m.role == MessageRole::User && m.kind == MessageKind::Text)
            })
            .and_then(|m| m.payload.get("request").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        log::info!("Resuming session {session_id} in {root}");
        let root = Path::new(&root);
        let summary = self.modeler().summarize(root, &request).await;
        let ctx = RunContext {
            session_id: session_id.to_string(),
            request,
            summary,
            objective_ids,
            plan_message_id: plan.map(|m| m.id),
            cancel,
        };
        self.pipeline(root).run(&ctx).await
    }
}

/// Objective IDs listed in a plan message payload, in plan order.
fn plan_objective_ids(payload: &Value) -> Vec<u64> {
    payload
        .get("objectives")
        .and_then(Value::as_array)
        .map(|objectives| {
            objectives
                .iter()
                .filter_map(|o| o.get("id").and_then(Value::as_u64))
                .collect()
        })
        .unwrap_or_default()
}
