//! Wrapper types for lists and composite views.

use std::fmt;

use crate::{
    models::{MessageKind, SessionSnapshot, SessionSummary},
    tools::ToolSpec,
};

/// Newtype wrapper for displaying a list of sessions.
///
/// # Examples
///
/// ```rust
/// use lantern_core::{display::SessionSummaries, models::SessionSummary};
/// use jiff::Timestamp;
///
/// let summary = SessionSummary {
///     id: "3f2a".to_string(),
///     project_root: Some("/home/user/site".to_string()),
///     message_count: 4,
///     last_activity_at: Timestamp::now(),
///     total_objectives: 3,
///     done_objectives: 2,
///     failed_objectives: 1,
/// };
///
/// let output = SessionSummaries(vec![summary]).to_string();
/// assert!(output.contains("3f2a (2/3 done, 1 failed)"));
/// ```
pub struct SessionSummaries(pub Vec<SessionSummary>);

impl SessionSummaries {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SessionSummary> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a SessionSummaries {
    type Item = &'a SessionSummary;
    type IntoIter = std::slice::Iter<'a, SessionSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for SessionSummaries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            writeln!(f, "No sessions found.")
        } else {
            for session in &self.0 {
                write!(f, "{session}")?;
            }
            Ok(())
        }
    }
}

/// A session with its objectives, their subtask entries and the latest run
/// summary, if one was recorded.
pub struct SessionReport {
    pub snapshot: SessionSnapshot,
    pub last_summary: Option<String>,
}

impl SessionReport {
    pub fn new(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot,
            last_summary: None,
        }
    }

    /// Attaches the newest summary message found in `messages`.
    pub fn with_messages(mut self, messages: &[crate::models::Message]) -> Self {
        self.last_summary = messages
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::Summary)
            .and_then(|m| m.payload.get("summary"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        self
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.snapshot.session)?;

        if self.snapshot.objectives.is_empty() {
            writeln!(f, "\nNo objectives in this session.")?;
        }
        for item in &self.snapshot.objectives {
            writeln!(f)?;
            write!(f, "{}", item.objective)?;
            if let Some(group) = &item.group {
                writeln!(f)?;
                write!(f, "{group}")?;
            }
        }

        if let Some(summary) = &self.last_summary {
            writeln!(f, "\n## Summary")?;
            writeln!(f)?;
            writeln!(f, "{summary}")?;
        }
        Ok(())
    }
}

/// The tool catalogue with parameter schemas.
pub struct ToolCatalog(pub Vec<ToolSpec>);

impl fmt::Display for ToolCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No tools registered.");
        }
        for spec in &self.0 {
            writeln!(f, "## {}", spec.name)?;
            writeln!(f)?;
            writeln!(f, "{}", spec.description)?;
            writeln!(f)?;
            for param in &spec.params {
                writeln!(
                    f,
                    "- `{}` ({}{}) {}",
                    param.name,
                    param.kind.as_str(),
                    if param.required { "" } else { ", optional" },
                    param.description
                )?;
            }
            if !spec.params.is_empty() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    #[test]
    fn test_catalog_lists_every_tool() {
        let registry = ToolRegistry::builtin();
        let output = ToolCatalog(registry.specs()).to_string();

        for name in registry.names() {
            assert!(output.contains(&format!("## {name}")));
        }
        assert!(output.contains("- `max_results` (integer, optional)"));
    }

    #[test]
    fn test_empty_collections() {
        assert_eq!(SessionSummaries(vec![]).to_string(), "No sessions found.\n");
        assert_eq!(ToolCatalog(vec![]).to_string(), "No tools registered.\n");
    }
}
