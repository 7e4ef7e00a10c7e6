//! Schema changes produced by the autodetector.
//!
//! Every change carries the fully rendered statement, so a list of changes can
//! be written to a migration file as-is with [`render_statements`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{DbDefinitionGroup, TableDefinitionGroup};

/// Statement terminator.
pub const STATEMENT_TERMINATOR: &str = ";";

/// What a change does to a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeAction {
    /// A definition that did not exist before.
    Define,
    /// A definition whose text changed.
    Overwrite,
    /// A definition that no longer exists.
    Remove,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Define => "define",
            Self::Overwrite => "overwrite",
            Self::Remove => "remove",
        })
    }
}

/// Where a changed definition lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeScope {
    /// Database-level group.
    Database(DbDefinitionGroup),
    /// Group inside a table.
    Table {
        /// Table name.
        table: String,
        /// Group inside the table.
        group: TableDefinitionGroup,
    },
}

impl fmt::Display for ChangeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(group) => write!(f, "{group}"),
            Self::Table { table, group } => write!(f, "{table}.{group}"),
        }
    }
}

/// One definition that differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    /// Group the definition belongs to.
    pub scope: ChangeScope,
    /// Definition name.
    pub name: String,
    /// Kind of change.
    pub action: ChangeAction,
    /// Statement that applies the change, without terminator.
    pub statement: String,
}

impl SchemaChange {
    /// Creates a change.
    #[must_use]
    pub fn new(
        scope: ChangeScope,
        name: impl Into<String>,
        action: ChangeAction,
        statement: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            name: name.into(),
            action,
            statement: statement.into(),
        }
    }

    /// Returns true if this change removes a table.
    #[must_use]
    pub fn is_table_removal(&self) -> bool {
        self.action == ChangeAction::Remove
            && self.scope == ChangeScope::Database(DbDefinitionGroup::Tables)
    }
}

/// Terminates every statement and separates them with a blank line.
///
/// Returns an empty string when there are no changes.
#[must_use]
pub fn render_statements(changes: &[SchemaChange]) -> String {
    changes
        .iter()
        .map(|change| format!("{}{STATEMENT_TERMINATOR}", change.statement))
        .collect::<Vec<_>>()
        .join("\n\n")
}
