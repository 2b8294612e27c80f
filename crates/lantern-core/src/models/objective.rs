//! Objective model: one high-level step of a generated plan.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::ObjectiveStatus;

/// Represents one high-level objective of a session's plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Objective {
    /// Unique identifier for the objective
    pub id: u64,

    /// ID of the owning session
    pub session_id: String,

    /// Short, actionable description
    pub text: String,

    /// Position within the session, contiguous from 1
    pub order: u32,

    /// Current lifecycle status
    pub status: ObjectiveStatus,

    /// Why the objective failed (decomposition error, cancellation, skipped
    /// subtasks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Lookup link to the decomposition, if one was persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask_group_id: Option<u64>,

    /// Timestamp when the objective was created (UTC)
    pub created_at: Timestamp,

    /// Timestamp when the objective was last updated (UTC)
    pub updated_at: Timestamp,
}
