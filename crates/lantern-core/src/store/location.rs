//! Where the state database lives and how it is brought up.

use std::path::{Path, PathBuf};

use tokio::task;

use super::StateStore;
use crate::{
    db::Database,
    error::{EngineError, Result},
};

/// Location of the SQLite file backing a [`StateStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreLocation {
    /// `$XDG_DATA_HOME/lantern/lantern.db`
    #[default]
    DataHome,
    File(PathBuf),
}

impl StoreLocation {
    /// The concrete file path, placing the XDG data directory if needed.
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            StoreLocation::File(path) => Ok(path.clone()),
            StoreLocation::DataHome => xdg::BaseDirectories::with_prefix("lantern")
                .place_data_file("lantern.db")
                .map_err(|e| EngineError::XdgDirectory(e.to_string())),
        }
    }
}

impl From<Option<PathBuf>> for StoreLocation {
    fn from(path: Option<PathBuf>) -> Self {
        path.map_or(StoreLocation::DataHome, StoreLocation::File)
    }
}

impl From<PathBuf> for StoreLocation {
    fn from(path: PathBuf) -> Self {
        StoreLocation::File(path)
    }
}

impl From<&Path> for StoreLocation {
    fn from(path: &Path) -> Self {
        StoreLocation::File(path.to_path_buf())
    }
}

impl From<&str> for StoreLocation {
    fn from(path: &str) -> Self {
        StoreLocation::File(PathBuf::from(path))
    }
}

impl StateStore {
    /// Opens the store at `location`, creating the file and schema on first
    /// use.
    ///
    /// # Errors
    ///
    /// * `EngineError::XdgDirectory` - If no data directory can be placed
    /// * `EngineError::FileSystem` - If the parent directory cannot be created
    /// * `EngineError::Database` - If the schema cannot be initialized
    pub async fn open(location: impl Into<StoreLocation>) -> Result<Self> {
        let db_path = location.into().resolve()?;

        match db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EngineError::FileSystem {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
            }
            _ => {}
        }

        let init_path = db_path.clone();
        task::spawn_blocking(move || Database::new(&init_path).map(drop))
            .await
            .map_err(EngineError::join)??;

        log::debug!("State store ready at {}", db_path.display());
        Ok(StateStore::new(db_path))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_location_from_cli_value() {
        assert_eq!(StoreLocation::from(None), StoreLocation::DataHome);
        assert_eq!(
            StoreLocation::from(Some(PathBuf::from("/tmp/l.db"))),
            StoreLocation::File(PathBuf::from("/tmp/l.db"))
        );
    }

    #[tokio::test]
    async fn test_open_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state/lantern.db");

        let store = StateStore::open(path.as_path()).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.database_path(), path);
        assert!(store.list_sessions().await.unwrap().is_empty());
    }
}
