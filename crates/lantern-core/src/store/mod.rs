//! Async facade over the synchronous [`Database`].
//!
//! Every operation opens its own connection inside
//! [`tokio::task::spawn_blocking`], so the store is cheap to clone and share
//! between concurrently running sessions. SQLite's WAL journal lets readers
//! proceed while one writer commits; the busy timeout serializes writers.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Pipeline /  │   │  StateStore  │   │   Database   │
//! │  Agent / UI  │──▶│ (async, Clone│──▶│ (rusqlite,   │
//! │              │   │  per call)   │   │  blocking)   │
//! └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use lantern_core::StateStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = StateStore::open("lantern.db").await?;
//!
//! let session = store.ensure_session("demo", Some("/srv/app".to_string())).await?;
//! let objectives = store
//!     .create_objectives(&session.id, vec!["Add a contact form".to_string()])
//!     .await?;
//! assert_eq!(objectives[0].order, 1);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::task;

use crate::{
    db::{subtask_queries::SubtaskUpdate, Database},
    error::{EngineError, Result},
    models::{
        Message, MessageKind, MessageRole, Objective, ObjectiveSnapshot, ObjectiveStatus, Session,
        SessionSnapshot, SessionSummary, SubtaskDraft, SubtaskEntry, SubtaskGroup,
    },
};

mod location;

pub use location::StoreLocation;

/// Persistent state of sessions, objectives, subtasks and messages.
#[derive(Debug, Clone)]
pub struct StateStore {
    db_path: PathBuf,
}

impl StateStore {
    pub(crate) fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    /// Path of the backing SQLite file.
    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Runs `op` against a fresh connection on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || {
            let mut db = Database::new(&db_path)?;
            op(&mut db)
        })
        .await
        .map_err(EngineError::join)?
    }

    /// Creates the session if needed and binds it to `project_root`.
    pub async fn ensure_session(&self, id: &str, project_root: Option<String>) -> Result<Session> {
        let id = id.to_string();
        self.blocking(move |db| db.ensure_session(&id, project_root.as_deref()))
            .await
    }

    /// Retrieves a session by its ID.
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let id = id.to_string();
        self.blocking(move |db| db.get_session(&id)).await
    }

    /// Lists sessions with objective counts, most recently active first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.blocking(|db| db.list_sessions()).await
    }

    /// Records activity on a session.
    pub async fn touch_session(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.blocking(move |db| db.touch_session(&id)).await
    }

    /// Appends objectives to a session with contiguous ascending orders.
    pub async fn create_objectives(
        &self,
        session_id: &str,
        texts: Vec<String>,
    ) -> Result<Vec<Objective>> {
        let session_id = session_id.to_string();
        self.blocking(move |db| db.create_objectives(&session_id, &texts))
            .await
    }

    /// Retrieves a session's objectives in plan order.
    pub async fn get_objectives(&self, session_id: &str) -> Result<Vec<Objective>> {
        let session_id = session_id.to_string();
        self.blocking(move |db| db.get_objectives(&session_id)).await
    }

    /// Retrieves a single objective.
    pub async fn get_objective(&self, id: u64) -> Result<Option<Objective>> {
        self.blocking(move |db| db.get_objective(id)).await
    }

    /// Moves an objective along its lifecycle.
    pub async fn set_objective_status(
        &self,
        id: u64,
        status: ObjectiveStatus,
        reason: Option<String>,
    ) -> Result<Objective> {
        log::debug!("Objective {id} -> {}", status.as_str());
        self.blocking(move |db| db.set_objective_status(id, status, reason.as_deref()))
            .await
    }

    /// Persists the subtask group of an objective.
    pub async fn create_subtask_group(
        &self,
        objective_id: u64,
        drafts: Vec<SubtaskDraft>,
    ) -> Result<SubtaskGroup> {
        self.blocking(move |db| db.create_subtask_group(objective_id, &drafts))
            .await
    }

    /// Retrieves the subtask group of an objective.
    pub async fn get_subtask_group(&self, objective_id: u64) -> Result<Option<SubtaskGroup>> {
        self.blocking(move |db| db.get_subtask_group(objective_id))
            .await
    }

    /// Applies a status change to a subtask entry.
    pub async fn update_subtask(&self, id: u64, update: SubtaskUpdate) -> Result<SubtaskEntry> {
        log::debug!("Subtask {id} -> {}", update.status.as_str());
        self.blocking(move |db| db.update_subtask(id, &update)).await
    }

    /// Appends a message to a session.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        kind: MessageKind,
        payload: Value,
    ) -> Result<Message> {
        let session_id = session_id.to_string();
        self.blocking(move |db| db.add_message(&session_id, role, kind, &payload))
            .await
    }

    /// Retrieves a session's messages in creation order.
    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let session_id = session_id.to_string();
        self.blocking(move |db| db.get_messages(&session_id)).await
    }

    /// Updates the status embedded for one objective in a plan message.
    pub async fn update_plan_message_status(
        &self,
        message_id: u64,
        objective_id: u64,
        status: ObjectiveStatus,
    ) -> Result<Message> {
        self.blocking(move |db| db.update_plan_message_status(message_id, objective_id, status))
            .await
    }

    /// Loads a session with its objectives and their subtask groups.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::SessionNotFound` if the session does not exist.
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot> {
        let session_id = session_id.to_string();
        self.blocking(move |db| {
            let session = db
                .get_session(&session_id)?
                .ok_or_else(|| EngineError::SessionNotFound {
                    id: session_id.clone(),
                })?;

            let objectives = db
                .get_objectives(&session_id)?
                .into_iter()
                .map(|objective| {
                    let group = db.get_subtask_group(objective.id)?;
                    Ok(ObjectiveSnapshot { objective, group })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(SessionSnapshot {
                session,
                objectives,
            })
        })
        .await
    }
}
