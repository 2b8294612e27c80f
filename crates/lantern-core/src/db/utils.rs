//! Row decoding helpers and project-root path handling.

use std::{
    env::current_dir,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use jiff::Timestamp;
use rusqlite::{types::Type, Row};

use crate::error::{EngineError, Result};

/// Reads an RFC 3339 timestamp column.
pub(crate) fn timestamp_at(row: &Row, index: usize) -> rusqlite::Result<Timestamp> {
    row.get::<_, String>(index)?
        .parse::<Timestamp>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

/// Reads a text column and parses it with `FromStr`.
pub(crate) fn parsed_at<T>(row: &Row, index: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(index)?;
    raw.parse::<T>().map_err(|reason| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, reason.into())
    })
}

/// Reads a JSON text column.
pub(crate) fn json_at<T>(row: &Row, index: usize) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

/// Normalizes a path by resolving "." and ".." components without requiring
/// the path to exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .fold(PathBuf::new(), |mut acc, component| {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    acc.pop();
                }
                _ => acc.push(component),
            }
            acc
        })
}

/// Makes a project root absolute using the current working directory.
pub fn absolute_project_root(directory: &str) -> Result<String> {
    let path = Path::new(directory);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = current_dir().map_err(|_| {
            EngineError::invalid_input("project")
                .with_reason("Cannot resolve current working directory to make path absolute")
        })?;
        cwd.join(path)
    };

    normalize_path(&absolute)
        .to_str()
        .map(String::from)
        .ok_or_else(|| {
            EngineError::invalid_input("project").with_reason("Cannot convert path to string")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_resolves_dots() {
        let path = normalize_path(Path::new("/srv/app/./src/../lib"));
        assert_eq!(path, PathBuf::from("/srv/app/lib"));
    }

    #[test]
    fn test_absolute_project_root_keeps_absolute_paths() {
        assert_eq!(absolute_project_root("/srv/app/").unwrap(), "/srv/app");
    }

    #[test]
    fn test_absolute_project_root_resolves_relative_paths() {
        let root = absolute_project_root("web").unwrap();
        assert!(Path::new(&root).is_absolute());
        assert!(root.ends_with("web"));
    }
}
