//! Migration executor.
//!
//! This module applies the migration files on disk to a database, one file at
//! a time and in name order, recording each file in the history right after
//! its import succeeds.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{LedgerDrift, Result};
use crate::history::MigrationHistory;
use crate::state::migration_names;
use crate::surreal::{Importer, QueryExecutor};

/// What remains to be done, given the recorded and on-disk migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationPlan {
    /// Every file on disk has been applied.
    UpToDate,
    /// Files that still need to be applied, in order.
    Pending(Vec<String>),
}

/// Result of a migrate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing to apply.
    UpToDate,
    /// Files applied during this run, in order.
    Applied(Vec<String>),
}

/// A migration file and whether it has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// File name.
    pub name: String,
    /// Whether the history records it.
    pub applied: bool,
}

/// Checks that `applied` is a prefix of `on_disk` and returns the rest.
///
/// Both lists must be sorted ascending.
pub fn plan_pending(applied: &[String], on_disk: &[String]) -> Result<MigrationPlan> {
    if applied.len() > on_disk.len() {
        return Err(LedgerDrift::MoreRecordedThanOnDisk {
            recorded: applied.len(),
            on_disk: on_disk.len(),
        }
        .into());
    }

    if let Some((index, (recorded, file))) = applied
        .iter()
        .zip(on_disk)
        .enumerate()
        .find(|(_, (recorded, file))| recorded != file)
    {
        return Err(LedgerDrift::Mismatch {
            index,
            recorded: recorded.clone(),
            on_disk: file.clone(),
        }
        .into());
    }

    if applied.len() == on_disk.len() {
        return Ok(MigrationPlan::UpToDate);
    }

    Ok(MigrationPlan::Pending(on_disk[applied.len()..].to_vec()))
}

/// Executes migrations against a database.
#[derive(Debug)]
pub struct MigrationExecutor<Q, I> {
    history: MigrationHistory<Q>,
    importer: I,
    migrations_dir: PathBuf,
}

impl<Q: QueryExecutor, I: Importer> MigrationExecutor<Q, I> {
    /// Creates a new migration executor for the files in `migrations_dir`.
    pub fn new(executor: Q, importer: I, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            history: MigrationHistory::new(executor),
            importer,
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Ensures the migrations history table exists.
    pub async fn init(&self) -> Result<()> {
        self.history.ensure_table().await
    }

    /// Returns the migration history.
    #[must_use]
    pub fn history(&self) -> &MigrationHistory<Q> {
        &self.history
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Compares the history with the files on disk.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        let applied = self.history.get_applied().await?;
        let on_disk = migration_names(&self.migrations_dir)?;
        plan_pending(&applied, &on_disk)
    }

    /// Lists every migration on disk with its applied state.
    ///
    /// Fails on drift, like [`Self::apply_pending`].
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let applied = self.history.get_applied().await?;
        let on_disk = migration_names(&self.migrations_dir)?;
        plan_pending(&applied, &on_disk)?;

        Ok(on_disk
            .into_iter()
            .enumerate()
            .map(|(index, name)| MigrationStatus {
                name,
                applied: index < applied.len(),
            })
            .collect())
    }

    /// Applies every pending migration, strictly in order.
    ///
    /// Stops at the first failure; files applied before it stay recorded and
    /// the failing file is not recorded.
    pub async fn apply_pending(&self) -> Result<ApplyOutcome> {
        self.init().await?;

        let pending = match self.plan().await? {
            MigrationPlan::UpToDate => {
                info!("Migrations are up to date.");
                return Ok(ApplyOutcome::UpToDate);
            }
            MigrationPlan::Pending(pending) => pending,
        };

        info!(count = pending.len(), "Running migrations...");
        for name in &pending {
            self.apply(name).await?;
        }

        Ok(ApplyOutcome::Applied(pending))
    }

    /// Imports one migration file and records it.
    async fn apply(&self, name: &str) -> Result<()> {
        info!(name, "Applying migration");
        self.importer
            .validate_and_import(&self.migrations_dir.join(name))
            .await?;
        self.history.record_applied(name).await?;
        info!(name, "Migration applied successfully");
        Ok(())
    }
}
