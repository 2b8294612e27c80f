//! `Display` implementations for the domain models.
//!
//! Output is markdown: headings for objectives, bullet metadata, and one
//! line per subtask entry with its status icon.

use std::fmt;

use super::datetime::LocalDateTime;
use crate::models::{
    MessageKind, MessageRole, Objective, ObjectiveStatus, ProjectSummary, Session,
    SessionSummary, SubtaskEntry, SubtaskGroup, SubtaskStatus,
};

impl fmt::Display for ObjectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Session {}", self.id)?;
        writeln!(f)?;
        if let Some(root) = &self.project_root {
            writeln!(f, "- Project: {root}")?;
        }
        writeln!(f, "- Messages: {}", self.message_count)?;
        writeln!(f, "- Created: {}", LocalDateTime(&self.created_at))?;
        writeln!(f, "- Last activity: {}", LocalDateTime(&self.last_activity_at))
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let progress = if self.total_objectives > 0 {
            format!(
                " ({}/{} done{})",
                self.done_objectives,
                self.total_objectives,
                if self.failed_objectives > 0 {
                    format!(", {} failed", self.failed_objectives)
                } else {
                    String::new()
                }
            )
        } else {
            String::new()
        };

        writeln!(f, "## {}{progress}", self.id)?;
        writeln!(f)?;
        if let Some(root) = &self.project_root {
            writeln!(f, "- **Project**: {root}")?;
        }
        writeln!(f, "- **Messages**: {}", self.message_count)?;
        writeln!(
            f,
            "- **Last activity**: {}",
            LocalDateTime(&self.last_activity_at)
        )?;
        writeln!(f)
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "## {}. {} ({})",
            self.order,
            self.text,
            self.status.with_icon()
        )?;
        if let Some(reason) = &self.failure_reason {
            writeln!(f)?;
            writeln!(f, "> {reason}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SubtaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- {} **{}** `{}`",
            self.status.with_icon(),
            self.name,
            self.tool
        )?;
        if self.attempts > 0 {
            write!(
                f,
                " - {} attempts in {} passes",
                self.attempts, self.passes
            )?;
        }
        writeln!(f)?;

        if self.status == SubtaskStatus::Skipped {
            if let Some(error) = &self.error {
                writeln!(f, "  - Error: {error}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for SubtaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ProjectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "- Kind: {}", self.kind)?;
        writeln!(f, "- Framework: {}", self.framework)?;
        if !self.languages.is_empty() {
            writeln!(f, "- Languages: {}", self.languages.join(", "))?;
        }
        if !self.key_files.is_empty() {
            writeln!(f, "- Key files: {}", self.key_files.join(", "))?;
        }
        if !self.notes.is_empty() {
            writeln!(f, "- Notes: {}", self.notes)?;
        }
        Ok(())
    }
}
