//! The two-level execution state machine.
//!
//! Objectives run strictly in plan order and their subtask entries in
//! position order, since later steps may depend on files produced by earlier
//! ones. A failing entry is retried by the [`RetryController`] and then given
//! one more independent controller pass before it is skipped. A failed
//! objective never stops the plan; only a cancellation or an error outside
//! the tool boundary does.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::decomposer::Decomposer;
use crate::{
    completion::{extract_payload, CompletionRequest, CompletionService, CompletionTask},
    db::subtask_queries::SubtaskUpdate,
    error::{EngineError, Result},
    events::{Broadcaster, RunEvent},
    models::{
        MessageKind, MessageRole, Objective, ObjectiveStatus, ProjectSummary, SubtaskEntry,
        SubtaskStatus,
    },
    store::StateStore,
    tools::{RetryController, ToolResult},
};

const SUMMARY_INSTRUCTIONS: &str = "You report on a finished automated run. Given the transition \
history, write a short natural-language summary of what was done and what failed. Reply with one \
JSON object: {\"summary\": string}.";

/// Reason recorded on an objective interrupted by a stop signal.
pub const CANCELLED_REASON: &str = "cancelled";

/// Passes after which a still-failing entry is skipped.
const SUBTASK_PASSES: u32 = 2;

/// Per-run inputs of the pipeline.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub session_id: String,
    pub request: String,
    pub summary: ProjectSummary,
    /// Objectives of the plan being executed, in plan order
    pub objective_ids: Vec<u64>,
    /// Plan message whose embedded statuses follow the objectives
    pub plan_message_id: Option<u64>,
    pub cancel: CancellationToken,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// False if any objective failed or the run was cancelled
    pub success: bool,
    pub summary: String,
    pub cancelled: bool,
    pub objectives_done: usize,
    pub objectives_failed: usize,
}

/// Outcome of one objective.
enum ObjectiveOutcome {
    Finished,
    Cancelled,
}

/// Drives a session's objectives to terminal states.
#[derive(Clone)]
pub struct ExecutionPipeline {
    store: StateStore,
    broadcaster: Broadcaster,
    completion: Arc<dyn CompletionService>,
    decomposer: Decomposer,
    controller: RetryController,
}

impl ExecutionPipeline {
    pub fn new(
        store: StateStore,
        broadcaster: Broadcaster,
        completion: Arc<dyn CompletionService>,
        decomposer: Decomposer,
        controller: RetryController,
    ) -> Self {
        Self {
            store,
            broadcaster,
            completion,
            decomposer,
            controller,
        }
    }

    /// Runs every non-terminal objective of the plan, then summarizes.
    ///
    /// Objectives of earlier plans in the same session are left untouched
    /// and do not count towards the report. `pending` objectives start
    /// normally; a `running` objective (left by an
    /// interrupted run) continues with its persisted subtask group, and its
    /// finished entries are not executed again.
    ///
    /// Emits `run-complete` as its last event on success. Errors outside the
    /// tool boundary are returned and leave the terminal event to the caller.
    pub async fn run(&self, ctx: &RunContext) -> Result<RunReport> {
        let objectives = self.plan_objectives(ctx).await?;
        let mut history = Vec::new();
        let mut cancelled = false;

        for objective in objectives {
            if objective.status.is_terminal() {
                history.push(format!(
                    "Objective {} \"{}\" was already {}",
                    objective.order,
                    objective.text,
                    objective.status.as_str()
                ));
                continue;
            }

            match self.run_objective(ctx, objective, &mut history).await? {
                ObjectiveOutcome::Finished => {}
                ObjectiveOutcome::Cancelled => {
                    cancelled = true;
                    break;
                }
            }
        }

        let objectives = self.plan_objectives(ctx).await?;
        let objectives_done = objectives
            .iter()
            .filter(|o| o.status == ObjectiveStatus::Done)
            .count();
        let objectives_failed = objectives
            .iter()
            .filter(|o| o.status == ObjectiveStatus::Failed)
            .count();
        let success = !cancelled && objectives_done == objectives.len();

        let summary = if cancelled {
            local_summary(&objectives, true)
        } else {
            self.summarize(ctx, &history, &objectives).await
        };

        self.store
            .add_message(
                &ctx.session_id,
                MessageRole::Assistant,
                MessageKind::Summary,
                json!({
                    "success": success,
                    "cancelled": cancelled,
                    "summary": summary,
                }),
            )
            .await?;
        self.store.touch_session(&ctx.session_id).await?;

        log::info!(
            "Run for session {} finished: {objectives_done} done, {objectives_failed} failed{}",
            ctx.session_id,
            if cancelled { ", cancelled" } else { "" }
        );
        self.broadcaster.publish(RunEvent::RunComplete {
            session_id: ctx.session_id.clone(),
            success,
            summary: summary.clone(),
        });

        Ok(RunReport {
            success,
            summary,
            cancelled,
            objectives_done,
            objectives_failed,
        })
    }

    async fn plan_objectives(&self, ctx: &RunContext) -> Result<Vec<Objective>> {
        let objectives = self.store.get_objectives(&ctx.session_id).await?;
        Ok(objectives
            .into_iter()
            .filter(|o| ctx.objective_ids.contains(&o.id))
            .collect())
    }

    async fn run_objective(
        &self,
        ctx: &RunContext,
        objective: Objective,
        history: &mut Vec<String>,
    ) -> Result<ObjectiveOutcome> {
        let objective = if objective.status == ObjectiveStatus::Pending {
            self.set_objective(ctx, &objective, ObjectiveStatus::Running, None)
                .await?
        } else {
            objective
        };
        history.push(format!(
            "Objective {} \"{}\" started",
            objective.order, objective.text
        ));

        if ctx.cancel.is_cancelled() {
            return self.cancel_objective(ctx, &objective, history).await;
        }

        let group = match self.store.get_subtask_group(objective.id).await? {
            Some(group) => group,
            None => {
                let drafts = match self
                    .decomposer
                    .decompose(
                        &ctx.request,
                        &ctx.summary,
                        &objective,
                        self.controller.dispatcher(),
                    )
                    .await
                {
                    Ok(drafts) => drafts,
                    Err(EngineError::Decomposition { reason }) => {
                        let reason = format!("decomposition error: {reason}");
                        history.push(format!("Objective {} failed: {reason}", objective.order));
                        self.set_objective(ctx, &objective, ObjectiveStatus::Failed, Some(reason))
                            .await?;
                        return Ok(ObjectiveOutcome::Finished);
                    }
                    Err(e) => return Err(e),
                };
                self.store.create_subtask_group(objective.id, drafts).await?
            }
        };

        for entry in &group.entries {
            if entry.status.is_terminal() {
                continue;
            }
            if ctx.cancel.is_cancelled() {
                return self.cancel_objective(ctx, &objective, history).await;
            }
            self.run_entry(ctx, &objective, entry, history).await?;
        }

        let entries = self
            .store
            .get_subtask_group(objective.id)
            .await?
            .map(|group| group.entries)
            .unwrap_or_default();
        let skipped = entries
            .iter()
            .filter(|e| e.status != SubtaskStatus::Done)
            .count();

        let (status, reason) = if skipped == 0 {
            (ObjectiveStatus::Done, None)
        } else {
            (
                ObjectiveStatus::Failed,
                Some(format!("{skipped} of {} subtasks skipped", entries.len())),
            )
        };
        history.push(format!(
            "Objective {} {}{}",
            objective.order,
            status.as_str(),
            reason
                .as_deref()
                .map(|r| format!(": {r}"))
                .unwrap_or_default()
        ));
        self.set_objective(ctx, &objective, status, reason).await?;
        Ok(ObjectiveOutcome::Finished)
    }

    /// Runs one entry to `done` or `skipped`.
    async fn run_entry(
        &self,
        ctx: &RunContext,
        objective: &Objective,
        entry: &SubtaskEntry,
        history: &mut Vec<String>,
    ) -> Result<()> {
        let mut carried_attempts = 0;
        let mut carried_error = None;

        loop {
            let running = self
                .store
                .update_subtask(
                    entry.id,
                    SubtaskUpdate {
                        status: SubtaskStatus::Running,
                        attempts: carried_attempts,
                        output: None,
                        error: carried_error.take(),
                    },
                )
                .await?;
            self.publish_subtask(ctx, objective, &running);

            let outcome = self
                .controller
                .run(&entry.tool, &entry.parameters, |notice| {
                    self.broadcaster.publish(RunEvent::ToolRetry {
                        session_id: ctx.session_id.clone(),
                        subtask_id: Some(entry.id),
                        tool: entry.tool.clone(),
                        attempt: notice.attempt,
                        max_attempts: notice.max_attempts,
                        error: notice.error.clone(),
                    });
                })
                .await;

            let ToolResult {
                success,
                data,
                error,
            } = outcome.result;

            if success {
                let done = self
                    .store
                    .update_subtask(
                        entry.id,
                        SubtaskUpdate {
                            status: SubtaskStatus::Done,
                            attempts: outcome.attempts,
                            output: Some(data.unwrap_or(Value::Null)),
                            error: None,
                        },
                    )
                    .await?;
                history.push(format!(
                    "  {} `{}` done after {} attempts",
                    done.name, done.tool, done.attempts
                ));
                self.publish_subtask(ctx, objective, &done);
                return Ok(());
            }

            let error = error.unwrap_or_else(|| "unknown error".to_string());
            if running.passes >= SUBTASK_PASSES {
                let skipped = self
                    .store
                    .update_subtask(
                        entry.id,
                        SubtaskUpdate {
                            status: SubtaskStatus::Skipped,
                            attempts: outcome.attempts,
                            output: None,
                            error: Some(error.clone()),
                        },
                    )
                    .await?;
                log::warn!(
                    "Skipping subtask {} ({}) after {} passes: {error}",
                    skipped.id,
                    skipped.tool,
                    skipped.passes
                );
                history.push(format!(
                    "  {} `{}` skipped: {error}",
                    skipped.name, skipped.tool
                ));
                self.publish_subtask(ctx, objective, &skipped);
                return Ok(());
            }

            log::info!(
                "Subtask {} ({}) failed pass {}, starting another: {error}",
                entry.id,
                entry.tool,
                running.passes
            );
            carried_attempts = outcome.attempts;
            carried_error = Some(error);
        }
    }

    async fn cancel_objective(
        &self,
        ctx: &RunContext,
        objective: &Objective,
        history: &mut Vec<String>,
    ) -> Result<ObjectiveOutcome> {
        log::info!(
            "Run for session {} cancelled at objective {}",
            ctx.session_id,
            objective.order
        );
        history.push(format!("Objective {} cancelled", objective.order));
        self.set_objective(
            ctx,
            objective,
            ObjectiveStatus::Failed,
            Some(CANCELLED_REASON.to_string()),
        )
        .await?;
        Ok(ObjectiveOutcome::Cancelled)
    }

    /// Persists an objective transition, mirrors it into the plan message
    /// and announces it.
    async fn set_objective(
        &self,
        ctx: &RunContext,
        objective: &Objective,
        status: ObjectiveStatus,
        reason: Option<String>,
    ) -> Result<Objective> {
        let updated = self
            .store
            .set_objective_status(objective.id, status, reason.clone())
            .await?;
        if let Some(message_id) = ctx.plan_message_id {
            self.store
                .update_plan_message_status(message_id, objective.id, status)
                .await?;
        }

        self.broadcaster.publish(RunEvent::ObjectiveStatus {
            session_id: ctx.session_id.clone(),
            objective_id: updated.id,
            order: updated.order,
            status,
            reason,
        });
        Ok(updated)
    }

    fn publish_subtask(&self, ctx: &RunContext, objective: &Objective, entry: &SubtaskEntry) {
        self.broadcaster.publish(RunEvent::SubtaskStatus {
            session_id: ctx.session_id.clone(),
            objective_id: objective.id,
            subtask_id: entry.id,
            position: entry.position,
            tool: entry.tool.clone(),
            status: entry.status,
            pass: entry.passes,
            error: match entry.status {
                SubtaskStatus::Skipped => entry.error.clone(),
                _ => None,
            },
        });
    }

    /// Asks the completion service for a summary of the run, falling back to
    /// a locally rendered one.
    async fn summarize(
        &self,
        ctx: &RunContext,
        history: &[String],
        objectives: &[Objective],
    ) -> String {
        let request = CompletionRequest::new(CompletionTask::Summarize, SUMMARY_INSTRUCTIONS).user(
            format!(
                "Request: {}\nTransition history:\n{}",
                ctx.request,
                history.join("\n")
            ),
        );

        match self.completion.complete(&request).await {
            Ok(reply) => {
                let from_payload = extract_payload(&reply).and_then(|payload| {
                    payload
                        .get("summary")
                        .and_then(Value::as_str)
                        .map(|s| s.trim().to_string())
                });
                match from_payload {
                    Some(summary) if !summary.is_empty() => summary,
                    _ if !reply.trim().is_empty() => reply.trim().to_string(),
                    _ => local_summary(objectives, false),
                }
            }
            Err(e) => {
                log::warn!("Summary generation failed, using local summary: {e}");
                local_summary(objectives, false)
            }
        }
    }
}

/// Plain summary built from the final objective states.
pub fn local_summary(objectives: &[Objective], cancelled: bool) -> String {
    let done = objectives
        .iter()
        .filter(|o| o.status == ObjectiveStatus::Done)
        .count();
    let mut summary = format!("Completed {done} of {} objectives.", objectives.len());

    for objective in objectives
        .iter()
        .filter(|o| o.status == ObjectiveStatus::Failed)
    {
        summary.push_str(&format!(
            " Objective {} \"{}\" failed: {}.",
            objective.order,
            objective.text,
            objective.failure_reason.as_deref().unwrap_or("unknown reason")
        ));
    }
    if cancelled {
        summary.push_str(" The run was stopped before finishing.");
    }
    summary
}
