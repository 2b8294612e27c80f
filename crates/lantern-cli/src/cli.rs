//! Command handlers for the terminal.
//!
//! Each handler calls into `lantern-core`, formats the result through the
//! core's markdown `Display` wrappers, and hands it to the renderer.

use anyhow::{bail, Context, Result};
use lantern_core::{
    display::{OperationStatus, RunResult, SessionReport, SessionSummaries, ToolCatalog},
    models::{ObjectiveStatus, SubtaskStatus},
    params::StartRun,
    ProgressEvent, RunEvent, RunManager, StateStore, ToolRegistry,
};
use log::debug;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::renderer::TerminalRenderer;

/// Terminal front end over the state store and, for runs, the run manager.
pub struct Cli {
    store: StateStore,
    renderer: TerminalRenderer,
}

impl Cli {
    pub fn new(store: StateStore, renderer: TerminalRenderer) -> Self {
        Self { store, renderer }
    }

    /// Starts a run and follows its events until it ends. Ctrl-C requests a
    /// stop; the run then finishes its current subtask and reports.
    pub async fn run(&self, runs: &RunManager, params: StartRun) -> Result<()> {
        let events = runs.engine().broadcaster().subscribe();
        let session_id = runs
            .start_run(params)
            .await
            .context("Failed to start run")?;
        self.renderer
            .render(&format!("# Session {session_id}\n"))?;

        self.follow(runs, &session_id, events).await
    }

    /// Resumes a session and follows its events until it ends.
    pub async fn resume(&self, runs: &RunManager, session_id: &str) -> Result<()> {
        let events = runs.engine().broadcaster().subscribe();
        runs.resume_run(session_id)
            .await
            .context("Failed to resume session")?;
        self.renderer
            .render(&format!("# Resuming session {session_id}\n"))?;

        self.follow(runs, session_id, events).await
    }

    async fn follow(
        &self,
        runs: &RunManager,
        session_id: &str,
        mut events: UnboundedReceiver<ProgressEvent>,
    ) -> Result<()> {
        let mut stop_requested = false;
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(ProgressEvent { event, .. }) = event else {
                        bail!("Event stream closed before the run finished");
                    };
                    if event.session_id() != session_id {
                        continue;
                    }
                    debug!("{event:?}");

                    match &event {
                        RunEvent::RunComplete { success, summary, .. } => {
                            let result = RunResult {
                                session_id,
                                success: *success,
                                summary,
                            };
                            self.renderer.render(&format!("\n{result}"))?;
                            return Ok(());
                        }
                        RunEvent::RunError { error, .. } => {
                            bail!("Run failed: {error}");
                        }
                        other => {
                            if let Some(line) = describe(other) {
                                self.renderer.render_progress(&line, is_setback(other))?;
                            }
                        }
                    }
                }
                signal = tokio::signal::ctrl_c(), if !stop_requested => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    stop_requested = true;
                    runs.stop_run(session_id);
                    let status = OperationStatus::success(
                        "Stop requested, finishing the current subtask".to_string(),
                    );
                    self.renderer.render(&status.to_string())?;
                }
            }
        }
    }

    /// Lists sessions.
    pub async fn sessions(&self) -> Result<()> {
        let sessions = self
            .store
            .list_sessions()
            .await
            .context("Failed to list sessions")?;
        let title = if sessions.is_empty() {
            "# No sessions found"
        } else {
            "# Sessions"
        };
        let sessions = SessionSummaries(sessions);

        if sessions.is_empty() {
            self.renderer.render(&format!("{title}\n"))
        } else {
            self.renderer.render(&format!("{title}\n\n{sessions}"))
        }
    }

    /// Shows one session with its objectives and subtask entries.
    pub async fn show(&self, session_id: &str) -> Result<()> {
        let snapshot = self
            .store
            .snapshot(session_id)
            .await
            .with_context(|| format!("Failed to load session {session_id}"))?;
        let messages = self
            .store
            .get_messages(session_id)
            .await
            .context("Failed to load session messages")?;

        let report = SessionReport::new(snapshot).with_messages(&messages);
        self.renderer.render(&report.to_string())
    }

    /// Shows the tool catalogue.
    pub fn tools(&self, registry: &ToolRegistry) -> Result<()> {
        let catalog = ToolCatalog(registry.specs());
        self.renderer.render(&format!("# Tools\n\n{catalog}"))
    }
}

/// Whether the event reports failed or skipped work.
fn is_setback(event: &RunEvent) -> bool {
    match event {
        RunEvent::ObjectiveStatus { status, .. } => *status == ObjectiveStatus::Failed,
        RunEvent::SubtaskStatus { status, .. } => *status == SubtaskStatus::Skipped,
        RunEvent::AgentStep { success, .. } => !success,
        _ => false,
    }
}

/// One progress line for a non-terminal event.
fn describe(event: &RunEvent) -> Option<String> {
    let line = match event {
        RunEvent::PlanCreated {
            objectives,
            fallback,
            ..
        } => {
            let mut line = format!(
                "## Plan{}\n",
                if *fallback { " (fallback)" } else { "" }
            );
            for objective in objectives {
                line.push_str(&format!("\n{}. {}", objective.order, objective.text));
            }
            line.push('\n');
            line
        }
        RunEvent::ObjectiveStatus {
            order,
            status,
            reason,
            ..
        } => match reason {
            Some(reason) => format!("**Objective {order}**: {status} ({reason})"),
            None => format!("**Objective {order}**: {status}"),
        },
        RunEvent::SubtaskStatus {
            position,
            tool,
            status,
            pass,
            error,
            ..
        } => match error {
            Some(error) => format!("  - `{tool}` #{position}: {status} after pass {pass}: {error}"),
            None if *pass > 1 => format!("  - `{tool}` #{position}: {status} (pass {pass})"),
            None => format!("  - `{tool}` #{position}: {status}"),
        },
        RunEvent::ToolRetry {
            tool,
            attempt,
            max_attempts,
            error,
            ..
        } => format!("    - `{tool}` attempt {attempt}/{max_attempts} failed: {error}"),
        RunEvent::AgentStep {
            iteration,
            tool,
            success,
            error,
            ..
        } => match error {
            Some(error) => format!("- Step {iteration}: `{tool}` failed: {error}"),
            None => format!(
                "- Step {iteration}: `{tool}` {}",
                if *success { "ok" } else { "failed" }
            ),
        },
        RunEvent::RunComplete { .. } | RunEvent::RunError { .. } => return None,
    };
    Some(line)
}
