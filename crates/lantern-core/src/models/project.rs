//! Project summary produced by the project modeler.

use serde::{Deserialize, Serialize};

/// Where a project summary came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// Classified by the completion service
    #[default]
    Model,
    /// Built from the file digest alone
    Heuristic,
}

/// Compact description of a project used as planning context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProjectSummary {
    /// Detected project kind (web-app, library, cli, ...)
    #[serde(default = "unknown")]
    pub kind: String,

    /// Detected framework, or "unknown"
    #[serde(default = "unknown")]
    pub framework: String,

    /// Primary languages, most used first
    #[serde(default)]
    pub languages: Vec<String>,

    /// Files worth reading first
    #[serde(default)]
    pub key_files: Vec<String>,

    /// Top-level areas of the tree
    #[serde(default)]
    pub areas: Vec<String>,

    /// Freeform notes
    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub source: SummarySource,
}

fn unknown() -> String {
    "unknown".to_string()
}

impl ProjectSummary {
    /// Render the summary as a compact block for prompts.
    pub fn to_prompt_context(&self) -> String {
        let mut out = format!(
            "Project kind: {}\nFramework: {}\nLanguages: {}\n",
            self.kind,
            self.framework,
            if self.languages.is_empty() {
                "unknown".to_string()
            } else {
                self.languages.join(", ")
            }
        );
        if !self.areas.is_empty() {
            out.push_str(&format!("Areas: {}\n", self.areas.join(", ")));
        }
        if !self.key_files.is_empty() {
            out.push_str(&format!("Key files: {}\n", self.key_files.join(", ")));
        }
        if !self.notes.is_empty() {
            out.push_str(&format!("Notes: {}\n", self.notes));
        }
        out
    }
}
