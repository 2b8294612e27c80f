//! Tool registry: the catalogue of named operations the engine can run
//! against a project tree.
//!
//! The registry is an explicit value built once and shared by reference
//! (usually behind an `Arc`). Each tool declares a [`ToolSpec`]; parameter
//! bags are validated against it by the [`ToolDispatcher`] before the
//! handler runs, so handlers can rely on required keys being present and
//! well typed.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod builtin;
pub mod dispatcher;
pub mod path;
pub mod retry;

pub use dispatcher::{ToolDispatcher, ToolResult};
pub use retry::{classify, ErrorClass, RetryController, RetryNotice, RetryOutcome, RetryPolicy};

/// Failure of a tool call. The `Display` text starts with the error category,
/// which is what [`retry::classify`] matches on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Timed out: {0}")]
    TimedOut(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl ToolError {
    /// Maps an I/O error on `path` to the matching category.
    pub fn io(path: &Path, error: &std::io::Error) -> Self {
        let subject = format!("{}: {error}", path.display());
        match error.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound(subject),
            std::io::ErrorKind::PermissionDenied => ToolError::PermissionDenied(subject),
            _ => ToolError::Io(subject),
        }
    }
}

/// Value kind accepted for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    /// A string resolved inside the project root
    Path,
    Integer,
    Boolean,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Path => "path",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

/// Name, description and parameter schema of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params: Vec::new(),
        }
    }

    /// Adds a required parameter.
    pub fn required(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        });
        self
    }

    /// Adds an optional parameter.
    pub fn optional(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            required: false,
            description: description.to_string(),
        });
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// One-line signature, e.g. `read_file{path}` or `list_directory{path?}`.
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.clone()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}{{{params}}}", self.name)
    }
}

/// What a tool may touch.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Absolute, normalized project root; all paths resolve inside it
    pub root: PathBuf,
    /// Default timeout for spawned processes
    pub command_timeout: Duration,
}

impl ToolContext {
    pub fn new(root: impl Into<PathBuf>, command_timeout: Duration) -> Self {
        Self {
            root: crate::db::utils::normalize_path(&root.into()),
            command_timeout,
        }
    }

    /// Resolves a tool path parameter inside the project root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ToolError> {
        path::resolve_in_root(&self.root, raw)
    }
}

/// Validated parameter bag with typed accessors.
#[derive(Debug, Clone, Copy)]
pub struct ToolParams<'a> {
    values: &'a Map<String, Value>,
}

impl<'a> ToolParams<'a> {
    pub fn new(values: &'a Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn str(&self, name: &str) -> Result<&'a str, ToolError> {
        self.opt_str(name)
            .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{name}'")))
    }

    pub fn opt_str(&self, name: &str) -> Option<&'a str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn opt_u64(&self, name: &str) -> Option<u64> {
        self.values.get(name).and_then(Value::as_u64)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }
}

/// Executable side of a tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    /// Runs the tool. Parameters have already been validated against
    /// [`ToolHandler::spec`].
    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError>;
}

/// Name → handler map with registration order preserved.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalogue.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for handler in builtin::all() {
            registry.register(handler);
        }
        registry
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        let name = tool.spec().name.clone();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Specs of all tools in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec().clone())
            .collect()
    }

    /// One line per tool with its description and typed parameters, as
    /// shown to the completion service.
    pub fn catalogue(&self) -> String {
        self.specs()
            .iter()
            .map(|spec| {
                let params = spec
                    .params
                    .iter()
                    .map(|p| {
                        format!(
                            "{}: {}{}",
                            p.name,
                            p.kind.as_str(),
                            if p.required { "" } else { " (optional)" }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- {} - {} [{params}]", spec.name, spec.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalogue_order() {
        let registry = ToolRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec![
                "read_file",
                "write_file",
                "delete_file",
                "create_directory",
                "list_directory",
                "search_code",
                "run_command",
                "apply_edit",
                "install_dependency",
            ]
        );
        assert!(!registry.contains("teleport_file"));
    }

    #[test]
    fn test_spec_signature_marks_optional_params() {
        let registry = ToolRegistry::builtin();
        let search = registry.get("search_code").unwrap();
        assert_eq!(
            search.spec().signature(),
            "search_code{pattern, path?, max_results?}"
        );
    }

    #[test]
    fn test_io_error_categories() {
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        let err = ToolError::io(Path::new("a.txt"), &missing);
        assert!(err.to_string().starts_with("Not found:"));

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err = ToolError::io(Path::new("/etc/passwd"), &denied);
        assert!(err.to_string().starts_with("Permission denied:"));
    }
}
