//! Autodetector for generating migrations from schema changes.
//!
//! This module compares two database states and generates the statements
//! needed to transform one into the other. `from` is the state reached by
//! replaying the existing migrations, `to` is the state declared by the
//! schema files.

use std::collections::BTreeSet;

use tracing::debug;

use crate::definition::{rewrite_database_definition, rewrite_table_definition, RewriteAction};
use crate::error::Result;
use crate::operations::{ChangeAction, ChangeScope, SchemaChange};
use crate::schema::{
    DatabaseState, DbDefinitionGroup, Definitions, TableDefinitionGroup, TableSnapshot,
};

/// Detects schema changes and generates the statements that apply them.
#[derive(Debug, Default)]
pub struct Autodetector;

impl Autodetector {
    /// Creates a new autodetector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Compares two states and returns the changes needed to transform
    /// `from` into `to`.
    ///
    /// Groups are walked in [`DbDefinitionGroup::ALL`] order and names in
    /// sorted order. Each table that is kept is immediately followed by the
    /// changes to its events, fields and indexes; a removed table contributes
    /// only its own removal.
    pub fn diff(&self, from: &DatabaseState, to: &DatabaseState) -> Result<Vec<SchemaChange>> {
        let mut changes = Vec::new();

        for group in DbDefinitionGroup::ALL {
            let from_defs = from.db.group(group);
            let to_defs = to.db.group(group);

            for name in all_names(from_defs, to_defs) {
                let change = compare(from_defs.get(name), to_defs.get(name), |statement, action| {
                    rewrite_database_definition(statement, action, group)
                })?;

                let mut table_removed = false;
                if let Some((action, statement)) = change {
                    debug!(group = %group, name, action = %action, "Detected change");
                    let change =
                        SchemaChange::new(ChangeScope::Database(group), name, action, statement);
                    table_removed = change.is_table_removal();
                    changes.push(change);
                }

                // Removing a table removes everything defined on it.
                if group == DbDefinitionGroup::Tables && !table_removed {
                    changes.extend(self.diff_table(name, from.table(name), to.table(name))?);
                }
            }
        }

        Ok(changes)
    }

    /// Compares the internals of one table.
    fn diff_table(
        &self,
        table: &str,
        from: Option<&TableSnapshot>,
        to: Option<&TableSnapshot>,
    ) -> Result<Vec<SchemaChange>> {
        let empty = Definitions::new();
        let mut changes = Vec::new();

        for group in TableDefinitionGroup::ALL {
            let from_defs = from.map_or(&empty, |t| t.group(group));
            let to_defs = to.map_or(&empty, |t| t.group(group));

            for name in all_names(from_defs, to_defs) {
                let change = compare(
                    from_defs.get(name),
                    to_defs.get(name),
                    rewrite_table_definition,
                )?;

                if let Some((action, statement)) = change {
                    debug!(table, group = %group, name, action = %action, "Detected change");
                    changes.push(SchemaChange::new(
                        ChangeScope::Table {
                            table: table.to_string(),
                            group,
                        },
                        name,
                        action,
                        statement,
                    ));
                }
            }
        }

        Ok(changes)
    }
}

/// Union of the names defined on either side, sorted.
fn all_names<'a>(from: &'a Definitions, to: &'a Definitions) -> BTreeSet<&'a str> {
    from.keys().chain(to.keys()).map(String::as_str).collect()
}

/// Decides what, if anything, turns `from` into `to` for a single name.
fn compare<F>(
    from: Option<&String>,
    to: Option<&String>,
    rewrite: F,
) -> Result<Option<(ChangeAction, String)>>
where
    F: Fn(&str, RewriteAction) -> Result<String>,
{
    match (from, to) {
        (Some(old), Some(new)) if old != new => Ok(Some((
            ChangeAction::Overwrite,
            rewrite(new.as_str(), RewriteAction::Overwrite)?,
        ))),
        (None, Some(new)) => Ok(Some((ChangeAction::Define, new.clone()))),
        (Some(old), None) => Ok(Some((
            ChangeAction::Remove,
            rewrite(old.as_str(), RewriteAction::Remove)?,
        ))),
        _ => Ok(None),
    }
}
