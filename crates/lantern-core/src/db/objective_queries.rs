//! Objective queries and status transitions.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension};

use super::utils::{parsed_at, timestamp_at};
use crate::{
    error::{DatabaseResultExt, EngineError, Result},
    models::{Objective, ObjectiveStatus},
};

const GET_NEXT_OBJECTIVE_ORDER_SQL: &str =
    "SELECT COALESCE(MAX(objective_order), 0) + 1 FROM objectives WHERE session_id = ?1";
const INSERT_OBJECTIVE_SQL: &str = "INSERT INTO objectives (session_id, text, objective_order, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)";
const TOUCH_SESSION_SQL: &str = "UPDATE sessions SET last_activity_at = ?1 WHERE id = ?2";
const SELECT_OBJECTIVE_COLUMNS: &str = "SELECT id, session_id, text, objective_order, status, failure_reason, subtask_group_id, created_at, updated_at FROM objectives";
const UPDATE_OBJECTIVE_STATUS_SQL: &str =
    "UPDATE objectives SET status = ?1, failure_reason = ?2, updated_at = ?3 WHERE id = ?4";
const TOUCH_SESSION_BY_OBJECTIVE_SQL: &str =
    "UPDATE sessions SET last_activity_at = ?1 WHERE id = (SELECT session_id FROM objectives WHERE id = ?2)";

impl super::Database {
    fn build_objective_from_row(row: &rusqlite::Row) -> rusqlite::Result<Objective> {
        Ok(Objective {
            id: row.get::<_, i64>(0)? as u64,
            session_id: row.get(1)?,
            text: row.get(2)?,
            order: row.get::<_, i64>(3)? as u32,
            status: parsed_at(row, 4)?,
            failure_reason: row.get(5)?,
            subtask_group_id: row.get::<_, Option<i64>>(6)?.map(|id| id as u64),
            created_at: timestamp_at(row, 7)?,
            updated_at: timestamp_at(row, 8)?,
        })
    }

    /// Appends objectives to a session in one transaction. Orders continue
    /// from the session's current maximum, so they stay contiguous from 1.
    pub fn create_objectives(&mut self, session_id: &str, texts: &[String]) -> Result<Vec<Objective>> {
        if texts.is_empty() {
            return Err(EngineError::invalid_input("objectives")
                .with_reason("a plan needs at least one objective"));
        }

        let tx = self
            .connection
            .transaction()
            .db_context("Failed to begin transaction")?;

        Self::require_session(&tx, session_id)?;

        let first_order: i64 = tx
            .query_row(GET_NEXT_OBJECTIVE_ORDER_SQL, params![session_id], |row| {
                row.get(0)
            })
            .db_context("Failed to get next objective order")?;

        let now = Timestamp::now();
        let now_str = now.to_string();
        let mut objectives = Vec::with_capacity(texts.len());

        for (offset, text) in texts.iter().enumerate() {
            let order = first_order + offset as i64;
            tx.execute(
                INSERT_OBJECTIVE_SQL,
                params![
                    session_id,
                    text,
                    order,
                    ObjectiveStatus::Pending.as_str(),
                    &now_str
                ],
            )
            .db_context("Failed to insert objective")?;

            objectives.push(Objective {
                id: tx.last_insert_rowid() as u64,
                session_id: session_id.to_string(),
                text: text.clone(),
                order: order as u32,
                status: ObjectiveStatus::Pending,
                failure_reason: None,
                subtask_group_id: None,
                created_at: now,
                updated_at: now,
            });
        }

        tx.execute(TOUCH_SESSION_SQL, params![&now_str, session_id])
            .db_context("Failed to update session activity")?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(objectives)
    }

    /// Retrieves all objectives of a session in plan order.
    pub fn get_objectives(&self, session_id: &str) -> Result<Vec<Objective>> {
        let sql = format!("{SELECT_OBJECTIVE_COLUMNS} WHERE session_id = ?1 ORDER BY objective_order");
        let mut stmt = self
            .connection
            .prepare(&sql)
            .db_context("Failed to prepare query")?;

        let objectives = stmt
            .query_map(params![session_id], Self::build_objective_from_row)
            .db_context("Failed to query objectives")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .db_context("Failed to fetch objectives")?;

        Ok(objectives)
    }

    /// Retrieves a single objective by its ID.
    pub fn get_objective(&self, id: u64) -> Result<Option<Objective>> {
        let sql = format!("{SELECT_OBJECTIVE_COLUMNS} WHERE id = ?1");
        self.connection
            .query_row(&sql, params![id as i64], Self::build_objective_from_row)
            .optional()
            .db_context("Failed to get objective")
    }

    /// Moves an objective to `status`, rejecting transitions the lifecycle
    /// does not allow. `reason` is stored for failed objectives.
    pub fn set_objective_status(
        &mut self,
        id: u64,
        status: ObjectiveStatus,
        reason: Option<&str>,
    ) -> Result<Objective> {
        let tx = self
            .connection
            .transaction()
            .db_context("Failed to begin transaction")?;

        let sql = format!("{SELECT_OBJECTIVE_COLUMNS} WHERE id = ?1");
        let current = tx
            .query_row(&sql, params![id as i64], Self::build_objective_from_row)
            .optional()
            .db_context("Failed to get objective")?
            .ok_or(EngineError::ObjectiveNotFound { id })?;

        if !current.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                entity: "objective",
                id,
                from: current.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let failure_reason = match status {
            ObjectiveStatus::Failed => reason.map(String::from),
            _ => None,
        };

        let now = Timestamp::now();
        let now_str = now.to_string();
        tx.execute(
            UPDATE_OBJECTIVE_STATUS_SQL,
            params![status.as_str(), &failure_reason, &now_str, id as i64],
        )
        .db_context("Failed to update objective status")?;

        tx.execute(TOUCH_SESSION_BY_OBJECTIVE_SQL, params![&now_str, id as i64])
            .db_context("Failed to update session activity")?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(Objective {
            status,
            failure_reason,
            updated_at: now,
            ..current
        })
    }
}
