//! Session summary types.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Summary information about a session with objective statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session ID
    pub id: String,
    /// Project root bound to the session
    pub project_root: Option<String>,
    /// Number of messages
    pub message_count: u32,
    /// Last activity timestamp
    pub last_activity_at: Timestamp,
    /// Total number of objectives
    pub total_objectives: u32,
    /// Number of objectives that finished successfully
    pub done_objectives: u32,
    /// Number of failed objectives
    pub failed_objectives: u32,
}

impl SessionSummary {
    /// Objectives that are neither done nor failed.
    pub fn open_objectives(&self) -> u32 {
        self.total_objectives
            .saturating_sub(self.done_objectives + self.failed_objectives)
    }
}
