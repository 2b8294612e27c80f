//! Database schema initialization and migrations.

use crate::error::{DatabaseResultExt, Result};

impl super::Database {
    /// Initializes the database schema using the embedded SQL file.
    pub(super) fn initialize_schema(&self) -> Result<()> {
        // Enable foreign keys for this connection
        self.connection
            .execute("PRAGMA foreign_keys = ON", [])
            .db_context("Failed to enable foreign keys")?;

        // WAL lets observers read while a pipeline writes
        self.connection
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .db_context("Failed to enable WAL journal")?;

        let schema_sql = include_str!("../../assets/schema.sql");
        self.connection
            .execute_batch(schema_sql)
            .db_context("Failed to initialize database schema")?;

        self.apply_migrations()?;

        Ok(())
    }

    /// Apply database migrations for existing databases
    fn apply_migrations(&self) -> Result<()> {
        // Databases created before entries tracked passes lack the column
        let has_passes_column: bool = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('subtask_entries') WHERE name = 'passes'",
                [],
                |row| row.get(0),
            )
            .map(|count: i64| count > 0)
            .db_context("Failed to inspect subtask_entries columns")?;

        if !has_passes_column {
            self.connection
                .execute(
                    "ALTER TABLE subtask_entries ADD COLUMN passes INTEGER NOT NULL DEFAULT 0",
                    [],
                )
                .db_context("Failed to add passes column to subtask_entries table")?;
        }

        Ok(())
    }
}
