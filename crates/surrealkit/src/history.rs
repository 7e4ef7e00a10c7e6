//! Migration history tracking.
//!
//! This module manages the `surrealkit_migration` table that records which
//! migration files have been applied to the target database. Rows are only
//! ever appended, one per successfully imported file.

use tracing::debug;

use crate::error::Result;
use crate::surreal::{query_as, QueryExecutor};

/// Table holding one row per applied migration.
pub const MIGRATIONS_TABLE: &str = "surrealkit_migration";

/// Statements that create the history table (idempotent).
pub const CREATE_MIGRATIONS_TABLE_SQL: [&str; 2] = [
    "DEFINE TABLE IF NOT EXISTS surrealkit_migration SCHEMAFULL TYPE NORMAL PERMISSIONS NONE",
    "DEFINE FIELD IF NOT EXISTS name ON surrealkit_migration TYPE string PERMISSIONS NONE",
];

/// Manages the migration history in the database.
#[derive(Debug, Clone)]
pub struct MigrationHistory<Q> {
    executor: Q,
}

impl<Q: QueryExecutor> MigrationHistory<Q> {
    /// Creates a new migration history manager.
    pub fn new(executor: Q) -> Self {
        Self { executor }
    }

    /// Returns the underlying executor.
    pub fn executor(&self) -> &Q {
        &self.executor
    }

    /// Ensures the migrations table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        for sql in CREATE_MIGRATIONS_TABLE_SQL {
            self.executor.execute(sql).await?;
        }
        Ok(())
    }

    /// Records a migration as applied.
    pub async fn record_applied(&self, name: &str) -> Result<()> {
        // A JSON string literal is also a valid SurrealQL string literal.
        let quoted = serde_json::to_string(name)?;
        let sql = format!("CREATE {MIGRATIONS_TABLE} SET name = type::string({quoted})");
        debug!(name, "Recording migration");
        self.executor.execute(&sql).await?;
        Ok(())
    }

    /// Gets the names of all applied migrations, sorted ascending.
    pub async fn get_applied(&self) -> Result<Vec<String>> {
        let sql = format!("SELECT VALUE name FROM {MIGRATIONS_TABLE} ORDER BY name ASC");
        let mut names: Vec<String> = query_as(&self.executor, &sql).await?;
        names.sort();
        Ok(names)
    }

    /// Checks if a migration has been applied.
    pub async fn is_applied(&self, name: &str) -> Result<bool> {
        Ok(self.get_applied().await?.iter().any(|n| n == name))
    }

    /// Counts applied migrations.
    pub async fn count_applied(&self) -> Result<usize> {
        Ok(self.get_applied().await?.len())
    }
}
