//! Run coordination: one background run per session, with stop signals.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{
    db::utils::absolute_project_root,
    engine::Engine,
    error::{EngineError, Result},
    events::RunEvent,
    models::{MessageKind, MessageRole},
    params::{RunMode, StartRun},
};

type ActiveRuns = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Removes a session's token from the active set when the run ends, however
/// it ends.
struct ActiveRun {
    active: ActiveRuns,
    session_id: String,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session_id);
    }
}

/// Starts, stops and resumes runs on the tokio runtime.
///
/// Every started run ends with exactly one `run-complete` or `run-error`
/// event on the engine's broadcaster.
#[derive(Clone)]
pub struct RunManager {
    engine: Engine,
    active: ActiveRuns,
}

impl RunManager {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            active: ActiveRuns::default(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Whether `session_id` has a run in flight.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    fn reserve(&self, session_id: &str) -> Result<(ActiveRun, CancellationToken)> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.contains_key(session_id) {
            return Err(EngineError::RunInProgress {
                session: session_id.to_string(),
            });
        }

        let token = CancellationToken::new();
        active.insert(session_id.to_string(), token.clone());
        Ok((
            ActiveRun {
                active: Arc::clone(&self.active),
                session_id: session_id.to_string(),
            },
            token,
        ))
    }

    /// Records the request and spawns the run. Returns the session ID, newly
    /// generated when `params.session` is absent.
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidInput` - Blank request, or a project that is not
    ///   a directory
    /// * `EngineError::RunInProgress` - The session already has an active run
    pub async fn start_run(&self, params: StartRun) -> Result<String> {
        params.validate()?;
        let root = absolute_project_root(&params.project)?;
        if !Path::new(&root).is_dir() {
            return Err(EngineError::invalid_input("project")
                .with_reason(format!("'{root}' is not a directory")));
        }

        let session_id = params
            .session
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (guard, cancel) = self.reserve(&session_id)?;

        let store = self.engine.store();
        store
            .ensure_session(&session_id, Some(root.clone()))
            .await?;
        store
            .add_message(
                &session_id,
                MessageRole::User,
                MessageKind::Text,
                json!({"request": params.request, "mode": params.mode}),
            )
            .await?;

        log::info!(
            "Starting {} run for session {session_id} in {root}",
            params.mode
        );
        let engine = self.engine.clone();
        let id = session_id.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let root = PathBuf::from(root);
            let result = match params.mode {
                RunMode::Plan => engine
                    .run_plan(&id, &params.request, &root, cancel)
                    .await
                    .map(|_| ()),
                RunMode::Agent => engine
                    .run_agent(&id, &params.request, &root, cancel)
                    .await
                    .map(|_| ()),
            };
            report_failure(&engine, &id, result);
        });

        Ok(session_id)
    }

    /// Re-enters the pipeline for a session's non-terminal objectives.
    ///
    /// # Errors
    ///
    /// * `EngineError::SessionNotFound` - If the session does not exist
    /// * `EngineError::RunInProgress` - The session already has an active run
    pub async fn resume_run(&self, session_id: &str) -> Result<()> {
        if self.engine.store().get_session(session_id).await?.is_none() {
            return Err(EngineError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        let (guard, cancel) = self.reserve(session_id)?;

        let engine = self.engine.clone();
        let id = session_id.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            let result = engine.resume(&id, cancel).await.map(|_| ());
            report_failure(&engine, &id, result);
        });
        Ok(())
    }

    /// Signals the session's run to stop before its next subtask. Returns
    /// whether a run was active.
    pub fn stop_run(&self, session_id: &str) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.get(session_id) {
            Some(token) => {
                log::info!("Stop requested for session {session_id}");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

fn report_failure(engine: &Engine, session_id: &str, result: Result<()>) {
    if let Err(e) = result {
        log::error!("Run for session {session_id} aborted: {e}");
        engine.broadcaster().publish(RunEvent::RunError {
            session_id: session_id.to_string(),
            error: e.to_string(),
        });
    }
}
