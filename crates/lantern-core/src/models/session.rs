//! Session ("chat") model: the conversation boundary.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Objective, SubtaskGroup};

/// A conversation that owns objectives and messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Unique identifier for the session
    pub id: String,

    /// Project root bound to this session
    pub project_root: Option<String>,

    /// Number of messages created in this session
    pub message_count: u32,

    /// Timestamp when the session was created (UTC)
    pub created_at: Timestamp,

    /// Timestamp of the last message or run activity (UTC)
    pub last_activity_at: Timestamp,
}

/// A session together with its objectives and their decompositions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub session: Session,
    pub objectives: Vec<ObjectiveSnapshot>,
}

/// One objective and its subtask group, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectiveSnapshot {
    #[serde(flatten)]
    pub objective: Objective,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<SubtaskGroup>,
}
