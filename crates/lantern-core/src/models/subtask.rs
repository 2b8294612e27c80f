//! Subtask group and entry models.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SubtaskStatus;

/// Decomposition output for exactly one objective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtaskGroup {
    /// Unique identifier for the group
    pub id: u64,

    /// ID of the objective this group decomposes
    pub objective_id: u64,

    /// Entries ordered by position, contiguous from 0
    pub entries: Vec<SubtaskEntry>,

    /// Timestamp when the group was created (UTC)
    pub created_at: Timestamp,
}

impl SubtaskGroup {
    /// True when every entry finished successfully.
    pub fn all_done(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.status == SubtaskStatus::Done)
    }
}

/// One concrete tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtaskEntry {
    /// Unique identifier for the entry
    pub id: u64,

    /// ID of the owning group
    pub group_id: u64,

    /// Execution position within the group
    pub position: u32,

    /// Human-readable description of the step
    pub name: String,

    /// Registry name of the tool to invoke
    pub tool: String,

    /// Parameter bag validated against the tool's schema
    pub parameters: Map<String, Value>,

    /// Current lifecycle status
    pub status: SubtaskStatus,

    /// Number of retry-controller passes started
    pub passes: u32,

    /// Number of dispatch attempts across all passes
    pub attempts: u32,

    /// Tool output of the successful attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Last error text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Timestamp when the entry was last updated (UTC)
    pub updated_at: Timestamp,
}

/// A validated subtask that has not been persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtaskDraft {
    pub name: String,
    pub tool: String,
    pub parameters: Map<String, Value>,
}
