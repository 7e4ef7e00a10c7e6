//! Migration file generation.
//!
//! Migration files are named `<timestamp>-<slug>.surql`, where the timestamp
//! is 15 digits of UTC time (down to tenths of a second) so that sorting file
//! names sorts migrations chronologically.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Timelike, Utc};
use tracing::info;

use crate::autodetector::Autodetector;
use crate::config::{ProjectLayout, SURQL_EXTENSION};
use crate::error::{MigrateError, Result};
use crate::operations::{render_statements, SchemaChange};
use crate::state::{FileOrdering, SnapshotProvider};

/// First lines of every schema-derived migration.
pub const SCHEMA_MIGRATION_HEADER: &str =
    "-- GENERATED SCHEMA MIGRATION: This file should not be edited. Modify the schema instead.\n\n";

/// Sortable 15-digit timestamp: `YYYYMMDDHHMMSS` plus tenths of a second.
#[must_use]
pub fn migration_timestamp(now: DateTime<Utc>) -> String {
    let tenths = now.nanosecond() % 1_000_000_000 / 100_000_000;
    format!("{}{}", now.format("%Y%m%d%H%M%S"), tenths)
}

/// Checks that a slug is usable in a file name.
pub fn validate_slug(slug: &str) -> Result<()> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(MigrateError::InvalidMigrationName(slug.to_string()))
    }
}

/// Generates a migration file name from a timestamp and a slug.
pub fn generate_migration_name(now: DateTime<Utc>, slug: &str) -> Result<String> {
    validate_slug(slug)?;
    Ok(format!(
        "{}-{slug}.{SURQL_EXTENSION}",
        migration_timestamp(now)
    ))
}

/// Computes the changes that bring the migrations in line with the schema.
///
/// Both states are materialized concurrently, each in its own instance.
pub async fn detect_schema_changes<P>(provider: &P, layout: &ProjectLayout) -> Result<Vec<SchemaChange>>
where
    P: SnapshotProvider + ?Sized,
{
    let migrations_dir = layout.migrations_dir();
    let schema_dir = layout.schema_dir();

    info!("Getting current database state from migration and schema files");
    let (from, to) = tokio::try_join!(
        provider.materialize(&migrations_dir, FileOrdering::Lexicographic),
        provider.materialize(&schema_dir, FileOrdering::Discovered),
    )?;

    Autodetector::new().diff(&from, &to)
}

/// Writes migration files into a directory.
#[derive(Debug, Clone)]
pub struct MigrationWriter {
    migrations_dir: PathBuf,
}

impl MigrationWriter {
    /// Creates a writer for `migrations_dir`.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Creates an empty migration to be filled in by hand.
    pub fn create_manual(&self, slug: &str, now: DateTime<Utc>) -> Result<PathBuf> {
        let name = generate_migration_name(now, slug)?;
        self.write(&name, "")
    }

    /// Creates a migration holding `changes`.
    ///
    /// Returns `None` without writing anything when there are no changes.
    pub fn create_schema_migration(
        &self,
        slug: &str,
        now: DateTime<Utc>,
        changes: &[SchemaChange],
    ) -> Result<Option<PathBuf>> {
        let name = generate_migration_name(now, slug)?;
        if changes.is_empty() {
            info!("Schema is up to date. No migrations created.");
            return Ok(None);
        }

        let contents = format!("{SCHEMA_MIGRATION_HEADER}{}", render_statements(changes));
        self.write(&name, &contents).map(Some)
    }

    fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.migrations_dir.join(name);
        std::fs::create_dir_all(&self.migrations_dir)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(MigrateError::MigrationExists(path));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(contents.as_bytes())?;

        info!(path = %path.display(), "Created migration");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::schema::{DatabaseState, DbDefinitionGroup, TableDefinitionGroup};

    /// Returns a canned state per directory.
    struct MapSnapshotProvider {
        states: HashMap<PathBuf, DatabaseState>,
    }

    #[async_trait]
    impl SnapshotProvider for MapSnapshotProvider {
        async fn materialize(&self, dir: &Path, _ordering: FileOrdering) -> Result<DatabaseState> {
            Ok(self.states.get(dir).cloned().unwrap_or_default())
        }
    }

    fn at(hour: u32, millis: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, hour, 5, 7).unwrap()
            + chrono::Duration::milliseconds(i64::from(millis))
    }

    fn user_state(field_type: &str) -> DatabaseState {
        DatabaseState::new()
            .define(DbDefinitionGroup::Tables, "user", "DEFINE TABLE user SCHEMAFULL")
            .define_in_table(
                "user",
                TableDefinitionGroup::Fields,
                "name",
                format!("DEFINE FIELD name ON user TYPE {field_type}"),
            )
    }

    #[test]
    fn test_migration_timestamp() {
        assert_eq!(migration_timestamp(at(14, 789)), "202403091405077");
        assert_eq!(migration_timestamp(at(9, 0)), "202403090905070");
        assert_eq!(migration_timestamp(at(9, 0)).len(), 15);
    }

    #[test]
    fn test_generate_migration_name() {
        assert_eq!(
            generate_migration_name(at(14, 250), "add_users").unwrap(),
            "202403091405072-add_users.surql"
        );
        assert!(generate_migration_name(at(14, 250), "").is_err());
        assert!(matches!(
            generate_migration_name(at(14, 250), "../escape"),
            Err(MigrateError::InvalidMigrationName(_))
        ));
    }

    #[test]
    fn test_names_sort_chronologically() {
        let earlier = generate_migration_name(at(9, 900), "zzz").unwrap();
        let later = generate_migration_name(at(10, 0), "aaa").unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn test_create_manual() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path().join("migrations"));

        let path = writer.create_manual("backfill", at(14, 0)).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "202403091405070-backfill.surql"
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        // Same name twice is refused.
        let result = writer.create_manual("backfill", at(14, 0));
        assert!(matches!(result, Err(MigrateError::MigrationExists(_))));
    }

    #[test]
    fn test_existing_file_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path());
        let path = dir.path().join("202403091405070-retype.surql");
        std::fs::write(&path, "DEFINE TABLE hand_written;").unwrap();

        let changes = [SchemaChange::new(
            crate::operations::ChangeScope::Database(DbDefinitionGroup::Tables),
            "user",
            crate::operations::ChangeAction::Define,
            "DEFINE TABLE user",
        )];
        let result = writer.create_schema_migration("retype", at(14, 0), &changes);

        assert!(matches!(result, Err(MigrateError::MigrationExists(p)) if p == path));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "DEFINE TABLE hand_written;"
        );
    }

    #[test]
    fn test_empty_schema_migration_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path());

        let result = writer.create_schema_migration("noop", at(14, 0), &[]).unwrap();
        assert!(result.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_schema_migration_from_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        layout.ensure_dirs().unwrap();

        let provider = MapSnapshotProvider {
            states: HashMap::from([
                (layout.migrations_dir(), user_state("string")),
                (layout.schema_dir(), user_state("int")),
            ]),
        };

        let changes = detect_schema_changes(&provider, &layout).await.unwrap();
        let writer = MigrationWriter::new(layout.migrations_dir());
        let path = writer
            .create_schema_migration("retype", at(14, 0), &changes)
            .unwrap()
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "-- GENERATED SCHEMA MIGRATION: This file should not be edited. Modify the schema instead.\n\nDEFINE FIELD OVERWRITE name ON user TYPE int;"
        );
    }

    #[tokio::test]
    async fn test_schema_in_sync_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        layout.ensure_dirs().unwrap();

        let provider = MapSnapshotProvider {
            states: HashMap::from([
                (layout.migrations_dir(), user_state("string")),
                (layout.schema_dir(), user_state("string")),
            ]),
        };

        let changes = detect_schema_changes(&provider, &layout).await.unwrap();
        assert!(changes.is_empty());

        let writer = MigrationWriter::new(layout.migrations_dir());
        let result = writer
            .create_schema_migration("noop", at(14, 0), &changes)
            .unwrap();
        assert!(result.is_none());
        assert_eq!(
            std::fs::read_dir(layout.migrations_dir()).unwrap().count(),
            0
        );
    }
}
