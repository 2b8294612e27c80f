//! Subtask group and entry queries.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use super::utils::{json_at, parsed_at, timestamp_at};
use crate::{
    error::{DatabaseResultExt, EngineError, Result},
    models::{SubtaskDraft, SubtaskEntry, SubtaskGroup, SubtaskStatus},
};

const CHECK_OBJECTIVE_EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM objectives WHERE id = ?1)";
const SELECT_GROUP_BY_OBJECTIVE_SQL: &str =
    "SELECT id, objective_id, created_at FROM subtask_groups WHERE objective_id = ?1";
const INSERT_GROUP_SQL: &str = "INSERT INTO subtask_groups (objective_id, created_at) VALUES (?1, ?2)";
const INSERT_ENTRY_SQL: &str = "INSERT INTO subtask_entries (group_id, position, name, tool, parameters, status, passes, attempts, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7)";
const LINK_GROUP_SQL: &str =
    "UPDATE objectives SET subtask_group_id = ?1, updated_at = ?2 WHERE id = ?3";
const SELECT_ENTRY_COLUMNS: &str = "SELECT id, group_id, position, name, tool, parameters, status, passes, attempts, output, error, updated_at FROM subtask_entries";
const UPDATE_ENTRY_SQL: &str = "UPDATE subtask_entries SET status = ?1, passes = ?2, attempts = ?3, output = ?4, error = ?5, updated_at = ?6 WHERE id = ?7";

/// A status change for one subtask entry, with what the pass produced.
#[derive(Debug, Clone, Default)]
pub struct SubtaskUpdate {
    pub status: SubtaskStatus,
    /// Dispatch attempts made since the previous update
    pub attempts: u32,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl SubtaskUpdate {
    /// An update that only changes the status.
    pub fn status(status: SubtaskStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

impl super::Database {
    fn build_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<SubtaskEntry> {
        let output: Option<String> = row.get(9)?;
        let output = output
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(SubtaskEntry {
            id: row.get::<_, i64>(0)? as u64,
            group_id: row.get::<_, i64>(1)? as u64,
            position: row.get::<_, i64>(2)? as u32,
            name: row.get(3)?,
            tool: row.get(4)?,
            parameters: json_at(row, 5)?,
            status: parsed_at(row, 6)?,
            passes: row.get::<_, i64>(7)? as u32,
            attempts: row.get::<_, i64>(8)? as u32,
            output,
            error: row.get(10)?,
            updated_at: timestamp_at(row, 11)?,
        })
    }

    /// Persists the decomposition of an objective. Entries get contiguous
    /// positions from 0 in the order given. Fails if the objective already
    /// has a group.
    pub fn create_subtask_group(
        &mut self,
        objective_id: u64,
        drafts: &[SubtaskDraft],
    ) -> Result<SubtaskGroup> {
        if drafts.is_empty() {
            return Err(EngineError::invalid_input("subtasks")
                .with_reason("a subtask group needs at least one entry"));
        }

        let tx = self
            .connection
            .transaction()
            .db_context("Failed to begin transaction")?;

        let exists: bool = tx
            .query_row(CHECK_OBJECTIVE_EXISTS_SQL, params![objective_id as i64], |row| {
                row.get(0)
            })
            .db_context("Failed to check objective existence")?;
        if !exists {
            return Err(EngineError::ObjectiveNotFound { id: objective_id });
        }

        let now = Timestamp::now();
        let now_str = now.to_string();

        tx.execute(INSERT_GROUP_SQL, params![objective_id as i64, &now_str])
            .db_context("Failed to insert subtask group")?;
        let group_id = tx.last_insert_rowid() as u64;

        let mut entries = Vec::with_capacity(drafts.len());
        for (position, draft) in drafts.iter().enumerate() {
            let parameters = serde_json::to_string(&draft.parameters)?;
            tx.execute(
                INSERT_ENTRY_SQL,
                params![
                    group_id as i64,
                    position as i64,
                    &draft.name,
                    &draft.tool,
                    &parameters,
                    SubtaskStatus::Pending.as_str(),
                    &now_str
                ],
            )
            .db_context("Failed to insert subtask entry")?;

            entries.push(SubtaskEntry {
                id: tx.last_insert_rowid() as u64,
                group_id,
                position: position as u32,
                name: draft.name.clone(),
                tool: draft.tool.clone(),
                parameters: draft.parameters.clone(),
                status: SubtaskStatus::Pending,
                passes: 0,
                attempts: 0,
                output: None,
                error: None,
                updated_at: now,
            });
        }

        tx.execute(
            LINK_GROUP_SQL,
            params![group_id as i64, &now_str, objective_id as i64],
        )
        .db_context("Failed to link subtask group")?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(SubtaskGroup {
            id: group_id,
            objective_id,
            entries,
            created_at: now,
        })
    }

    /// Retrieves the subtask group of an objective with entries in position
    /// order.
    pub fn get_subtask_group(&self, objective_id: u64) -> Result<Option<SubtaskGroup>> {
        let group = self
            .connection
            .query_row(
                SELECT_GROUP_BY_OBJECTIVE_SQL,
                params![objective_id as i64],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                        timestamp_at(row, 2)?,
                    ))
                },
            )
            .optional()
            .db_context("Failed to get subtask group")?;

        let Some((id, objective_id, created_at)) = group else {
            return Ok(None);
        };

        let sql = format!("{SELECT_ENTRY_COLUMNS} WHERE group_id = ?1 ORDER BY position");
        let mut stmt = self
            .connection
            .prepare(&sql)
            .db_context("Failed to prepare query")?;
        let entries = stmt
            .query_map(params![id as i64], Self::build_entry_from_row)
            .db_context("Failed to query subtask entries")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .db_context("Failed to fetch subtask entries")?;

        Ok(Some(SubtaskGroup {
            id,
            objective_id,
            entries,
            created_at,
        }))
    }

    /// Retrieves a single subtask entry by its ID.
    pub fn get_subtask(&self, id: u64) -> Result<Option<SubtaskEntry>> {
        let sql = format!("{SELECT_ENTRY_COLUMNS} WHERE id = ?1");
        self.connection
            .query_row(&sql, params![id as i64], Self::build_entry_from_row)
            .optional()
            .db_context("Failed to get subtask entry")
    }

    /// Applies a status change to a subtask entry. Entering `Running` starts
    /// a new pass; attempts accumulate; output and error replace the stored
    /// values when given.
    pub fn update_subtask(&mut self, id: u64, update: &SubtaskUpdate) -> Result<SubtaskEntry> {
        let tx = self
            .connection
            .transaction()
            .db_context("Failed to begin transaction")?;

        let sql = format!("{SELECT_ENTRY_COLUMNS} WHERE id = ?1");
        let current = tx
            .query_row(&sql, params![id as i64], Self::build_entry_from_row)
            .optional()
            .db_context("Failed to get subtask entry")?
            .ok_or(EngineError::SubtaskNotFound { id })?;

        if !current.status.can_transition_to(update.status) {
            return Err(EngineError::InvalidTransition {
                entity: "subtask",
                id,
                from: current.status.as_str().to_string(),
                to: update.status.as_str().to_string(),
            });
        }

        let passes = if update.status == SubtaskStatus::Running {
            current.passes + 1
        } else {
            current.passes
        };
        let attempts = current.attempts + update.attempts;
        let output = update.output.clone().or(current.output);
        let error = update.error.clone().or(current.error);
        let output_json = output.as_ref().map(serde_json::to_string).transpose()?;

        let now = Timestamp::now();
        tx.execute(
            UPDATE_ENTRY_SQL,
            params![
                update.status.as_str(),
                passes as i64,
                attempts as i64,
                &output_json,
                &error,
                now.to_string(),
                id as i64
            ],
        )
        .db_context("Failed to update subtask entry")?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(SubtaskEntry {
            status: update.status,
            passes,
            attempts,
            output,
            error,
            updated_at: now,
            ..current
        })
    }
}
