//! State reconstruction from schema and migration files.
//!
//! A [`SnapshotProvider`] turns a directory of `.surql` files into a
//! [`DatabaseState`]. The production provider replays the files into a
//! throwaway in-memory instance and introspects the result; the autodetector
//! then compares the state reached by the migrations with the state declared
//! by the schema.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::config::{RetryPolicy, SURQL_EXTENSION};
use crate::error::{MigrateError, Result};
use crate::schema::{DatabaseState, DbSnapshot, TableSnapshot};
use crate::surreal::{
    escape_ident, free_port, query_as, EphemeralServer, Importer, QueryExecutor, SurrealCli,
};

/// How the files of a directory are ordered before replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrdering {
    /// Top-level files sorted by name; for migrations, which form an ordered log.
    Lexicographic,
    /// Every file found recursively; for schema files, which are idempotent
    /// declarations and may be replayed in any order.
    Discovered,
}

/// Produces the state a directory of definition files leads to.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Replays the files of `dir` and returns the resulting state.
    ///
    /// Fails with [`MigrateError::Replay`] if a file is rejected.
    async fn materialize(&self, dir: &Path, ordering: FileOrdering) -> Result<DatabaseState>;
}

/// Lists the `.surql` files of `dir` in the given ordering.
///
/// A missing directory has no files.
pub fn discover_files(dir: &Path, ordering: FileOrdering) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    match ordering {
        FileOrdering::Lexicographic => {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_file() && has_surql_extension(&path) {
                    files.push(path);
                }
            }
            files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
            Ok(files)
        }
        FileOrdering::Discovered => {
            // The directory itself may contain pattern characters.
            let pattern = format!(
                "{}/**/*.{SURQL_EXTENSION}",
                glob::Pattern::escape(&dir.to_string_lossy())
            );
            let mut files = Vec::new();
            for entry in glob::glob(&pattern)? {
                let path = entry?;
                if path.is_file() {
                    files.push(path);
                }
            }
            Ok(files)
        }
    }
}

/// Names of the migration files in `dir`, sorted ascending.
pub fn migration_names(dir: &Path) -> Result<Vec<String>> {
    Ok(discover_files(dir, FileOrdering::Lexicographic)?
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect())
}

fn has_surql_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SURQL_EXTENSION)
}

/// Validates every file, then imports them in order.
///
/// Nothing is imported unless all files validate.
pub async fn replay<I>(importer: &I, files: &[PathBuf]) -> Result<()>
where
    I: Importer + ?Sized,
{
    for file in files {
        importer
            .validate(file)
            .await
            .map_err(|e| replay_error(file, &e))?;
    }
    for file in files {
        importer
            .import(file)
            .await
            .map_err(|e| replay_error(file, &e))?;
    }
    Ok(())
}

fn replay_error(file: &Path, err: &MigrateError) -> MigrateError {
    let cause = match err {
        MigrateError::Import { message, .. } => message.clone(),
        other => other.to_string(),
    };
    MigrateError::Replay {
        file: file.to_path_buf(),
        cause,
    }
}

/// Reads database and table definitions from a live database.
///
/// Tables are introspected concurrently.
pub async fn introspect<Q>(executor: &Q) -> Result<DatabaseState>
where
    Q: QueryExecutor + ?Sized,
{
    let db: DbSnapshot = query_as(executor, "INFO FOR DB").await?;

    let tables = try_join_all(db.tables.keys().map(|name| async move {
        debug!(table = %name, "Introspecting table");
        let query = format!("INFO FOR TABLE {}", escape_ident(name));
        let info: TableSnapshot = query_as(executor, &query).await?;
        Ok::<_, MigrateError>((name.clone(), info))
    }))
    .await?;

    Ok(DatabaseState {
        db,
        tables: tables.into_iter().collect(),
    })
}

/// Materializes snapshots in throwaway in-memory SurrealDB instances.
#[derive(Debug, Clone)]
pub struct EphemeralSnapshotProvider {
    binary: PathBuf,
    retry: RetryPolicy,
}

impl EphemeralSnapshotProvider {
    /// Creates a provider that starts instances with `binary`.
    pub fn new(binary: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            binary: binary.into(),
            retry,
        }
    }
}

#[async_trait]
impl SnapshotProvider for EphemeralSnapshotProvider {
    async fn materialize(&self, dir: &Path, ordering: FileOrdering) -> Result<DatabaseState> {
        let files = discover_files(dir, ordering)?;
        info!(dir = %dir.display(), files = files.len(), "Building database state");

        let mut server = EphemeralServer::start(&self.binary, free_port()?)?;
        let client = SurrealCli::new(&self.binary, server.connection());
        client.connect(&self.retry).await?;
        server.ensure_running()?;
        client.define_namespace_and_database().await?;

        replay(&client, &files).await?;
        let state = introspect(&client).await?;

        server.shutdown().await?;
        Ok(state)
    }
}
