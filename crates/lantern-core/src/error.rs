//! Error types for the engine library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors of the engine library.
///
/// Tool failures never appear here: they are captured in a `ToolResult`
/// envelope and handled by the retry controller. Everything below either
/// fails one objective (`Decomposition`) or aborts the run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database connection or query errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: rusqlite::Error,
    },
    /// Session not found for the given ID
    #[error("Session with ID {id} not found")]
    SessionNotFound { id: String },
    /// Objective not found for the given ID
    #[error("Objective with ID {id} not found")]
    ObjectiveNotFound { id: u64 },
    /// Subtask entry not found for the given ID
    #[error("Subtask with ID {id} not found")]
    SubtaskNotFound { id: u64 },
    /// A status change that the lifecycle does not allow
    #[error("Invalid {entity} transition for ID {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: u64,
        from: String,
        to: String,
    },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// XDG directory specification errors
    #[error("XDG directory error: {0}")]
    XdgDirectory(String),
    /// Invalid input validation errors
    #[error("Invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },
    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    /// A blocking store task panicked or was cancelled
    #[error("Store task failed: {message}")]
    StoreTask { message: String },
    /// The completion service could not be reached or failed to answer
    #[error("Completion service error: {message}")]
    Completion { message: String },
    /// An objective could not be decomposed into valid subtasks
    #[error("Decomposition error: {reason}")]
    Decomposition { reason: String },
    /// The session already has an active run
    #[error("Session {session} already has an active run")]
    RunInProgress { session: String },
}

/// Builder for creating input validation errors.
pub struct InvalidInputBuilder {
    field: String,
}

impl InvalidInputBuilder {
    /// Create a new invalid input error builder for a field.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Build the error with the given reason.
    pub fn with_reason(self, reason: impl Into<String>) -> EngineError {
        EngineError::InvalidInput {
            field: self.field,
            reason: reason.into(),
        }
    }
}

impl EngineError {
    /// Creates a builder for input validation errors.
    pub fn invalid_input(field: impl Into<String>) -> InvalidInputBuilder {
        InvalidInputBuilder::new(field)
    }

    /// Creates a completion-service error from any displayable message.
    pub fn completion(message: impl Into<String>) -> Self {
        Self::Completion {
            message: message.into(),
        }
    }

    /// Wraps a `spawn_blocking` join failure.
    pub(crate) fn join(error: tokio::task::JoinError) -> Self {
        Self::StoreTask {
            message: error.to_string(),
        }
    }
}

/// Attaches a message to SQLite failures.
pub trait DatabaseResultExt<T> {
    fn db_context(self, message: &str) -> Result<T>;
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context(self, message: &str) -> Result<T> {
        self.map_err(|source| EngineError::Database {
            message: message.to_string(),
            source,
        })
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
