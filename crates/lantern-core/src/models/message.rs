//! Message model: append-only session records used for replay.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MessageKind, MessageRole};

/// A user input, agent narration, or structured plan/step/summary record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: u64,
    pub session_id: String,
    pub role: MessageRole,
    pub kind: MessageKind,
    pub payload: Value,
    pub created_at: Timestamp,
}
