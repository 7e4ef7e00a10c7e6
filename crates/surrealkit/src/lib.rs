//! Schema-diffing migrations for SurrealDB.
//!
//! `surrealkit` keeps a declarative schema (`schema/**/*.surql`) and an
//! ordered log of migration files (`migrations/*.surql`) in sync:
//! - The schema is the source of truth; migrations are generated by diffing
//!   the state the migrations lead to against the state the schema declares
//! - Migrations are applied to a target database strictly in order, and each
//!   applied file is recorded in a ledger table inside that database
//! - The ledger must always be a prefix of the files on disk; anything else
//!   is drift and stops the run before any file is imported
//!
//! # Architecture
//!
//! - **Schema** - Snapshots of what a database defines, as returned by `INFO FOR`
//! - **Definition** - Parses `DEFINE` statements and rewrites them to overwrite or remove
//! - **Autodetector** - Diffs two snapshots into an ordered list of changes
//! - **State** - Replays source files into throwaway instances and introspects them
//! - **Writer** - Creates timestamped migration files
//! - **History** / **Executor** - The ledger and the apply loop
//! - **Surreal** - Drives the `surreal` binary
//!
//! # CLI Usage
//!
//! ```bash
//! # Create an empty migration to fill in by hand
//! surrealkit new backfill_users
//!
//! # Generate a migration from schema changes
//! surrealkit diff add_user_email
//!
//! # Apply pending migrations
//! surrealkit migrate
//!
//! # Show which migrations have been applied
//! surrealkit status
//! ```

pub mod autodetector;
pub mod config;
pub mod definition;
pub mod error;
pub mod executor;
pub mod history;
pub mod operations;
pub mod schema;
pub mod state;
pub mod surreal;
pub mod writer;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::autodetector::Autodetector;
    pub use crate::config::{ConnectionConfig, ProjectLayout, RetryPolicy};
    pub use crate::definition::{
        rewrite_database_definition, rewrite_table_definition, ParsedDefinition, RewriteAction,
    };
    pub use crate::error::{LedgerDrift, MigrateError, Result};
    pub use crate::executor::{ApplyOutcome, MigrationExecutor, MigrationPlan, MigrationStatus};
    pub use crate::history::MigrationHistory;
    pub use crate::operations::{render_statements, ChangeAction, ChangeScope, SchemaChange};
    pub use crate::schema::{
        DatabaseState, DbDefinitionGroup, DbSnapshot, Definitions, TableDefinitionGroup,
        TableSnapshot,
    };
    pub use crate::state::{EphemeralSnapshotProvider, FileOrdering, SnapshotProvider};
    pub use crate::surreal::{EphemeralServer, Importer, QueryExecutor, SurrealCli};
    pub use crate::writer::{detect_schema_changes, generate_migration_name, MigrationWriter};
}
