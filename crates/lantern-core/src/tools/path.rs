//! Project-root scoping for tool paths and the directories scans skip.

use std::path::{Path, PathBuf};

use super::ToolError;
use crate::db::utils::normalize_path;

/// Dependency, build and tool-state directories never scanned or searched.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".lantern",
    ".next",
    ".venv",
    "__pycache__",
    "build",
    "dist",
    "node_modules",
    "target",
    "venv",
];

/// Whether a directory name is skipped by project scans.
pub fn is_ignored_dir(name: &str) -> bool {
    IGNORED_DIRS.contains(&name)
}

/// Resolves `raw` against `root` and rejects anything that lands outside it.
///
/// Relative paths are joined onto the root; absolute paths are accepted only
/// when they already point inside it. `..` components are resolved lexically
/// before the check, so `src/../../etc` is caught.
pub fn resolve_in_root(root: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidParameters("path must not be empty".to_string()));
    }
    if trimmed.contains('\0') {
        return Err(ToolError::InvalidParameters(format!(
            "path '{}' contains a NUL byte",
            trimmed.replace('\0', "\\0")
        )));
    }

    let candidate = Path::new(trimmed);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let resolved = normalize_path(&joined);
    let root = normalize_path(root);
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(ToolError::PermissionDenied(format!(
            "{trimmed} is outside the project root"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_resolve_under_root() {
        let path = resolve_in_root(Path::new("/srv/app"), "src/./main.rs").unwrap();
        assert_eq!(path, PathBuf::from("/srv/app/src/main.rs"));
    }

    #[test]
    fn test_traversal_is_rejected() {
        let err = resolve_in_root(Path::new("/srv/app"), "src/../../etc/passwd").unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
        assert!(err.to_string().starts_with("Permission denied:"));
    }

    #[test]
    fn test_absolute_paths_must_stay_inside_root() {
        assert!(resolve_in_root(Path::new("/srv/app"), "/srv/app/README.md").is_ok());
        assert!(resolve_in_root(Path::new("/srv/app"), "/etc/passwd").is_err());
        assert!(resolve_in_root(Path::new("/srv/app"), "/srv/application").is_err());
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let err = resolve_in_root(Path::new("/srv/app"), "  ").unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
