//! Message queries.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use super::utils::{json_at, parsed_at, timestamp_at};
use crate::{
    error::{DatabaseResultExt, EngineError, Result},
    models::{Message, MessageKind, MessageRole, ObjectiveStatus},
};

const INSERT_MESSAGE_SQL: &str = "INSERT INTO messages (session_id, role, kind, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5)";
const BUMP_SESSION_SQL: &str = "UPDATE sessions SET message_count = message_count + 1, last_activity_at = ?1 WHERE id = ?2";
const SELECT_MESSAGE_COLUMNS: &str =
    "SELECT id, session_id, role, kind, payload, created_at FROM messages";
const UPDATE_MESSAGE_PAYLOAD_SQL: &str = "UPDATE messages SET payload = ?1 WHERE id = ?2";

impl super::Database {
    fn build_message_from_row(row: &rusqlite::Row) -> rusqlite::Result<Message> {
        Ok(Message {
            id: row.get::<_, i64>(0)? as u64,
            session_id: row.get(1)?,
            role: parsed_at(row, 2)?,
            kind: parsed_at(row, 3)?,
            payload: json_at(row, 4)?,
            created_at: timestamp_at(row, 5)?,
        })
    }

    /// Appends a message and bumps the session's message count and activity
    /// time in the same transaction.
    pub fn add_message(
        &mut self,
        session_id: &str,
        role: MessageRole,
        kind: MessageKind,
        payload: &Value,
    ) -> Result<Message> {
        let tx = self
            .connection
            .transaction()
            .db_context("Failed to begin transaction")?;

        Self::require_session(&tx, session_id)?;

        let now = Timestamp::now();
        let now_str = now.to_string();
        let payload_json = serde_json::to_string(payload)?;

        tx.execute(
            INSERT_MESSAGE_SQL,
            params![session_id, role.as_str(), kind.as_str(), &payload_json, &now_str],
        )
        .db_context("Failed to insert message")?;
        let id = tx.last_insert_rowid() as u64;

        tx.execute(BUMP_SESSION_SQL, params![&now_str, session_id])
            .db_context("Failed to update session counters")?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(Message {
            id,
            session_id: session_id.to_string(),
            role,
            kind,
            payload: payload.clone(),
            created_at: now,
        })
    }

    /// Retrieves all messages of a session in creation order.
    pub fn get_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let sql = format!("{SELECT_MESSAGE_COLUMNS} WHERE session_id = ?1 ORDER BY id");
        let mut stmt = self
            .connection
            .prepare(&sql)
            .db_context("Failed to prepare query")?;

        let messages = stmt
            .query_map(params![session_id], Self::build_message_from_row)
            .db_context("Failed to query messages")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .db_context("Failed to fetch messages")?;

        Ok(messages)
    }

    /// Rewrites the embedded status of one objective inside a plan message's
    /// payload, so replaying the message shows current progress.
    pub fn update_plan_message_status(
        &mut self,
        message_id: u64,
        objective_id: u64,
        status: ObjectiveStatus,
    ) -> Result<Message> {
        let tx = self
            .connection
            .transaction()
            .db_context("Failed to begin transaction")?;

        let sql = format!("{SELECT_MESSAGE_COLUMNS} WHERE id = ?1");
        let mut message = tx
            .query_row(&sql, params![message_id as i64], Self::build_message_from_row)
            .optional()
            .db_context("Failed to get message")?
            .ok_or_else(|| {
                EngineError::invalid_input("message")
                    .with_reason(format!("message {message_id} does not exist"))
            })?;

        if message.kind != MessageKind::Plan {
            return Err(EngineError::invalid_input("message")
                .with_reason(format!("message {message_id} is not a plan")));
        }

        let entry = message
            .payload
            .get_mut("objectives")
            .and_then(Value::as_array_mut)
            .and_then(|objectives| {
                objectives
                    .iter_mut()
                    .find(|o| o.get("id").and_then(Value::as_u64) == Some(objective_id))
            })
            .ok_or(EngineError::ObjectiveNotFound { id: objective_id })?;

        entry["status"] = Value::String(status.as_str().to_string());

        let payload_json = serde_json::to_string(&message.payload)?;
        tx.execute(
            UPDATE_MESSAGE_PAYLOAD_SQL,
            params![&payload_json, message_id as i64],
        )
        .db_context("Failed to update message payload")?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(message)
    }
}
