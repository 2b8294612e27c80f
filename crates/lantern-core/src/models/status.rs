//! Status enumerations for objectives and subtask entries.
//!
//! Both lifecycles only move forward. The allowed edges are encoded in
//! `can_transition_to` and enforced by the state store, so a caller can never
//! reopen a terminal entity.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a high-level objective.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveStatus {
    /// Created by the planner, not started yet
    #[default]
    Pending,

    /// Subtasks are being executed
    Running,

    /// Every subtask finished successfully
    Done,

    /// At least one subtask was skipped, decomposition failed, or the run was
    /// cancelled
    Failed,
}

impl FromStr for ObjectiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ObjectiveStatus::Pending),
            "running" => Ok(ObjectiveStatus::Running),
            "done" => Ok(ObjectiveStatus::Done),
            "failed" => Ok(ObjectiveStatus::Failed),
            _ => Err(format!("Invalid objective status: {s}")),
        }
    }
}

impl ObjectiveStatus {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveStatus::Pending => "pending",
            ObjectiveStatus::Running => "running",
            ObjectiveStatus::Done => "done",
            ObjectiveStatus::Failed => "failed",
        }
    }

    /// Whether no further transitions can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ObjectiveStatus::Done | ObjectiveStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ObjectiveStatus) -> bool {
        matches!(
            (self, next),
            (ObjectiveStatus::Pending, ObjectiveStatus::Running)
                | (ObjectiveStatus::Running, ObjectiveStatus::Done)
                | (ObjectiveStatus::Running, ObjectiveStatus::Failed)
        )
    }

    /// Status with a consistent icon for display.
    ///
    /// ```rust
    /// use lantern_core::models::ObjectiveStatus;
    ///
    /// assert_eq!(ObjectiveStatus::Done.with_icon(), "✓ Done");
    /// assert_eq!(ObjectiveStatus::Failed.with_icon(), "✗ Failed");
    /// ```
    pub fn with_icon(&self) -> &'static str {
        match self {
            ObjectiveStatus::Pending => "○ Pending",
            ObjectiveStatus::Running => "➤ Running",
            ObjectiveStatus::Done => "✓ Done",
            ObjectiveStatus::Failed => "✗ Failed",
        }
    }
}

/// Lifecycle of a single tool-backed subtask entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskStatus {
    /// Not dispatched yet
    #[default]
    Pending,

    /// A retry-controller pass is in flight
    Running,

    /// The tool call succeeded
    Done,

    /// Both retry-controller passes were exhausted
    Skipped,
}

impl FromStr for SubtaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SubtaskStatus::Pending),
            "running" => Ok(SubtaskStatus::Running),
            "done" => Ok(SubtaskStatus::Done),
            "skipped" => Ok(SubtaskStatus::Skipped),
            _ => Err(format!("Invalid subtask status: {s}")),
        }
    }
}

impl SubtaskStatus {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskStatus::Pending => "pending",
            SubtaskStatus::Running => "running",
            SubtaskStatus::Done => "done",
            SubtaskStatus::Skipped => "skipped",
        }
    }

    /// Whether no further transitions can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubtaskStatus::Done | SubtaskStatus::Skipped)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Running -> Running` starts the second, independent retry pass.
    pub fn can_transition_to(&self, next: SubtaskStatus) -> bool {
        matches!(
            (self, next),
            (SubtaskStatus::Pending, SubtaskStatus::Running)
                | (SubtaskStatus::Running, SubtaskStatus::Running)
                | (SubtaskStatus::Running, SubtaskStatus::Done)
                | (SubtaskStatus::Running, SubtaskStatus::Skipped)
        )
    }

    /// Status with a consistent icon for display.
    pub fn with_icon(&self) -> &'static str {
        match self {
            SubtaskStatus::Pending => "○ Pending",
            SubtaskStatus::Running => "➤ Running",
            SubtaskStatus::Done => "✓ Done",
            SubtaskStatus::Skipped => "⤼ Skipped",
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            _ => Err(format!("Invalid message role: {s}")),
        }
    }
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// Shape of a message payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Free text (user request, agent narration)
    Text,
    /// Objective list with embedded statuses
    Plan,
    /// One single-loop agent tool call
    Step,
    /// Final run summary
    Summary,
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "plan" => Ok(MessageKind::Plan),
            "step" => Ok(MessageKind::Step),
            "summary" => Ok(MessageKind::Summary),
            _ => Err(format!("Invalid message kind: {s}")),
        }
    }
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Plan => "plan",
            MessageKind::Step => "step",
            MessageKind::Summary => "summary",
        }
    }
}
