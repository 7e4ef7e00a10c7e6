//! Error types for the migration system.

use std::path::PathBuf;

/// The ways the migration ledger can disagree with the files on disk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerDrift {
    /// The ledger references migrations that are no longer on disk.
    #[error(
        "there are more migrations in the database ({recorded}) than on disk ({on_disk})"
    )]
    MoreRecordedThanOnDisk {
        /// Number of recorded migrations.
        recorded: usize,
        /// Number of migration files on disk.
        on_disk: usize,
    },

    /// A file below the last applied migration was renamed, reordered or removed.
    #[error(
        "migration #{index} is recorded as '{recorded}' but the file on disk is '{on_disk}'"
    )]
    Mismatch {
        /// Position of the first mismatch.
        index: usize,
        /// Name stored in the ledger.
        recorded: String,
        /// Name found on disk at the same position.
        on_disk: String,
    },
}

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A definition returned by introspection does not have the expected shape.
    #[error("Invalid definition: {statement}")]
    MalformedDefinition {
        /// The offending statement.
        statement: String,
    },

    /// A source file could not be replayed into a snapshot database.
    #[error("Failed to replay '{file}': {cause}")]
    Replay {
        /// The file that failed.
        file: PathBuf,
        /// Underlying failure.
        cause: String,
    },

    /// Recorded migrations and migration files disagree.
    #[error("Migrations out of sync: {0}")]
    LedgerDrift(#[from] LedgerDrift),

    /// A migration file failed validation or import.
    #[error("Failed to import '{file}': {message}")]
    Import {
        /// The migration file.
        file: PathBuf,
        /// Output of the failed step.
        message: String,
    },

    /// The database never became reachable.
    #[error("Took too long to connect to database at {endpoint} ({attempts} attempts)")]
    Connection {
        /// Endpoint that was probed.
        endpoint: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A query was rejected by the database.
    #[error("Query failed: {message}\n  query: {query}")]
    Query {
        /// The query text.
        query: String,
        /// Error returned by the database.
        message: String,
    },

    /// An external program could not be run.
    #[error("Failed to run '{program}': {message}")]
    Command {
        /// Program that was invoked.
        program: String,
        /// Error message.
        message: String,
    },

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration slug contains characters unfit for a file name.
    #[error("Invalid migration name '{0}': use letters, digits, '_' or '-'")]
    InvalidMigrationName(String),

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// A file pattern could not be expanded.
    #[error("Invalid file pattern: {0}")]
    Glob(String),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

impl From<glob::PatternError> for MigrateError {
    fn from(err: glob::PatternError) -> Self {
        Self::Glob(err.to_string())
    }
}

impl From<glob::GlobError> for MigrateError {
    fn from(err: glob::GlobError) -> Self {
        Self::Glob(err.to_string())
    }
}

impl MigrateError {
    /// Returns true for errors caused by ledger drift.
    #[must_use]
    pub fn is_drift(&self) -> bool {
        matches!(self, Self::LedgerDrift(_))
    }
}
