//! Database operations and SQLite management for the state store.
//!
//! This module provides low-level, synchronous database operations. Each
//! submodule extends [`Database`] with the queries for one entity:
//! sessions, objectives, subtask groups/entries and messages.
//!
//! Status changes are validated here against the lifecycle rules in
//! [`crate::models::status`], inside the same transaction that writes them.

use std::{path::Path, time::Duration};

use rusqlite::Connection;

use crate::error::{DatabaseResultExt, Result};

pub mod message_queries;
pub mod migrations;
pub mod objective_queries;
pub mod session_queries;
pub mod subtask_queries;
pub mod utils;

/// How long a writer waits for another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection and operations handler.
pub struct Database {
    connection: Connection,
}

impl Database {
    /// Creates a new database connection and initializes the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection = Connection::open(path).db_context("Failed to open database connection")?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .db_context("Failed to set busy timeout")?;

        let db = Self { connection };
        db.initialize_schema()?;
        Ok(db)
    }
}
