//! Session queries.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension};

use super::utils::timestamp_at;
use crate::{
    error::{DatabaseResultExt, EngineError, Result},
    models::{ObjectiveStatus, Session, SessionSummary},
};

const INSERT_SESSION_SQL: &str = "INSERT OR IGNORE INTO sessions (id, project_root, message_count, created_at, last_activity_at) VALUES (?1, ?2, 0, ?3, ?3)";
const UPDATE_SESSION_PROJECT_SQL: &str =
    "UPDATE sessions SET project_root = ?1, last_activity_at = ?2 WHERE id = ?3";
const TOUCH_SESSION_SQL: &str = "UPDATE sessions SET last_activity_at = ?1 WHERE id = ?2";
const SELECT_SESSION_SQL: &str = "SELECT id, project_root, message_count, created_at, last_activity_at FROM sessions WHERE id = ?1";
const SELECT_SESSION_SUMMARIES_SQL: &str = "SELECT s.id, s.project_root, s.message_count, s.last_activity_at, \
     (SELECT COUNT(*) FROM objectives o WHERE o.session_id = s.id), \
     (SELECT COUNT(*) FROM objectives o WHERE o.session_id = s.id AND o.status = ?1), \
     (SELECT COUNT(*) FROM objectives o WHERE o.session_id = s.id AND o.status = ?2) \
     FROM sessions s ORDER BY s.last_activity_at DESC, s.id";
const CHECK_SESSION_EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)";

impl super::Database {
    fn build_session_from_row(row: &rusqlite::Row) -> rusqlite::Result<Session> {
        Ok(Session {
            id: row.get(0)?,
            project_root: row.get(1)?,
            message_count: row.get::<_, i64>(2)? as u32,
            created_at: timestamp_at(row, 3)?,
            last_activity_at: timestamp_at(row, 4)?,
        })
    }

    /// Creates the session if it does not exist yet and binds it to
    /// `project_root` when one is given. Returns the stored session.
    pub fn ensure_session(&mut self, id: &str, project_root: Option<&str>) -> Result<Session> {
        if id.trim().is_empty() {
            return Err(EngineError::invalid_input("session").with_reason("must not be empty"));
        }

        let tx = self
            .connection
            .transaction()
            .db_context("Failed to begin transaction")?;

        let now = Timestamp::now().to_string();
        tx.execute(INSERT_SESSION_SQL, params![id, project_root, &now])
            .db_context("Failed to insert session")?;

        if let Some(root) = project_root {
            tx.execute(UPDATE_SESSION_PROJECT_SQL, params![root, &now, id])
                .db_context("Failed to bind session project")?;
        }

        let session = tx
            .query_row(SELECT_SESSION_SQL, params![id], Self::build_session_from_row)
            .db_context("Failed to load session")?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(session)
    }

    /// Retrieves a session by its ID.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.connection
            .query_row(SELECT_SESSION_SQL, params![id], Self::build_session_from_row)
            .optional()
            .db_context("Failed to get session")
    }

    /// Records activity on a session without creating a message.
    pub fn touch_session(&self, id: &str) -> Result<()> {
        let now = Timestamp::now().to_string();
        let rows = self
            .connection
            .execute(TOUCH_SESSION_SQL, params![&now, id])
            .db_context("Failed to touch session")?;

        if rows == 0 {
            return Err(EngineError::SessionNotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Lists all sessions with objective counts, most recently active first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self
            .connection
            .prepare(SELECT_SESSION_SUMMARIES_SQL)
            .db_context("Failed to prepare query")?;

        let sessions = stmt
            .query_map(
                params![
                    ObjectiveStatus::Done.as_str(),
                    ObjectiveStatus::Failed.as_str()
                ],
                |row| {
                    Ok(SessionSummary {
                        id: row.get(0)?,
                        project_root: row.get(1)?,
                        message_count: row.get::<_, i64>(2)? as u32,
                        last_activity_at: timestamp_at(row, 3)?,
                        total_objectives: row.get::<_, i64>(4)? as u32,
                        done_objectives: row.get::<_, i64>(5)? as u32,
                        failed_objectives: row.get::<_, i64>(6)? as u32,
                    })
                },
            )
            .db_context("Failed to query sessions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .db_context("Failed to fetch sessions")?;

        Ok(sessions)
    }

    /// Returns an error unless the session exists.
    pub(crate) fn require_session(tx: &rusqlite::Transaction, id: &str) -> Result<()> {
        let exists: bool = tx
            .query_row(CHECK_SESSION_EXISTS_SQL, params![id], |row| row.get(0))
            .db_context("Failed to check session existence")?;

        if exists {
            Ok(())
        } else {
            Err(EngineError::SessionNotFound { id: id.to_string() })
        }
    }
}
